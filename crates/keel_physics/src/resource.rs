//! Cooked collision resources shared between shapes
//!
//! Meshes and height fields are immutable once created. Their descriptors are
//! the persisted form as well: a resource can always be turned back into the
//! descriptor that would recreate it.

use serde::{Deserialize, Serialize};

use crate::error::{PhysicsError, Result};

/// Axis-aligned bounds of a vertex set
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

impl Bounds {
    fn from_points(points: &[[f32; 3]]) -> Self {
        let mut bounds = Bounds {
            min: [f32::MAX; 3],
            max: [f32::MIN; 3],
        };
        for point in points {
            for axis in 0..3 {
                bounds.min[axis] = bounds.min[axis].min(point[axis]);
                bounds.max[axis] = bounds.max[axis].max(point[axis]);
            }
        }
        bounds
    }

    pub fn extents(&self) -> [f32; 3] {
        [
            self.max[0] - self.min[0],
            self.max[1] - self.min[1],
            self.max[2] - self.min[2],
        ]
    }
}

fn invalid(message: impl Into<String>) -> PhysicsError {
    PhysicsError::InvalidDescriptor(message.into())
}

fn check_points(kind: &str, points: &[[f32; 3]], minimum: usize) -> Result<()> {
    if points.len() < minimum {
        return Err(invalid(format!(
            "{kind} needs at least {minimum} vertices, got {}",
            points.len()
        )));
    }
    if let Some(index) = points.iter().position(|p| p.iter().any(|v| !v.is_finite())) {
        return Err(invalid(format!("{kind} vertex {index} is not finite")));
    }
    Ok(())
}

/// Triangle mesh source data
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriangleMeshDesc {
    pub vertices: Vec<[f32; 3]>,
    pub triangles: Vec<[u32; 3]>,
}

impl TriangleMeshDesc {
    pub fn new(vertices: Vec<[f32; 3]>, triangles: Vec<[u32; 3]>) -> Self {
        Self {
            vertices,
            triangles,
        }
    }

    pub fn validate(&self) -> Result<()> {
        check_points("triangle mesh", &self.vertices, 3)?;
        if self.triangles.is_empty() {
            return Err(invalid("triangle mesh has no triangles"));
        }

        let vertex_count = self.vertices.len() as u64;
        for (index, [a, b, c]) in self.triangles.iter().copied().enumerate() {
            if [a, b, c].iter().any(|i| u64::from(*i) >= vertex_count) {
                return Err(invalid(format!(
                    "triangle {index} indexes past the {vertex_count} vertices"
                )));
            }
            if a == b || b == c || a == c {
                return Err(invalid(format!("triangle {index} is degenerate")));
            }
        }
        Ok(())
    }
}

/// Immutable triangle mesh resource
#[derive(Debug, Clone, PartialEq)]
pub struct TriangleMesh {
    vertices: Box<[[f32; 3]]>,
    triangles: Box<[[u32; 3]]>,
    bounds: Bounds,
}

impl TriangleMesh {
    /// Build from a descriptor that has already been validated
    pub(crate) fn from_desc(desc: &TriangleMeshDesc) -> Self {
        Self {
            vertices: desc.vertices.clone().into_boxed_slice(),
            triangles: desc.triangles.clone().into_boxed_slice(),
            bounds: Bounds::from_points(&desc.vertices),
        }
    }

    pub fn vertices(&self) -> &[[f32; 3]] {
        &self.vertices
    }

    pub fn triangles(&self) -> &[[u32; 3]] {
        &self.triangles
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn to_desc(&self) -> TriangleMeshDesc {
        TriangleMeshDesc::new(self.vertices.to_vec(), self.triangles.to_vec())
    }
}

/// Convex hull source points
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConvexMeshDesc {
    pub vertices: Vec<[f32; 3]>,
}

impl ConvexMeshDesc {
    /// Largest hull the kernel accepts
    pub const MAX_VERTICES: usize = 255;

    pub fn new(vertices: Vec<[f32; 3]>) -> Self {
        Self { vertices }
    }

    pub fn validate(&self) -> Result<()> {
        check_points("convex mesh", &self.vertices, 4)?;
        if self.vertices.len() > Self::MAX_VERTICES {
            return Err(invalid(format!(
                "convex mesh has {} vertices, limit is {}",
                self.vertices.len(),
                Self::MAX_VERTICES
            )));
        }

        let extents = Bounds::from_points(&self.vertices).extents();
        if extents.iter().any(|e| *e <= 0.0) {
            return Err(invalid("convex mesh vertices are coplanar"));
        }
        Ok(())
    }
}

/// Immutable convex mesh resource
#[derive(Debug, Clone, PartialEq)]
pub struct ConvexMesh {
    vertices: Box<[[f32; 3]]>,
    bounds: Bounds,
}

impl ConvexMesh {
    pub(crate) fn from_desc(desc: &ConvexMeshDesc) -> Self {
        Self {
            vertices: desc.vertices.clone().into_boxed_slice(),
            bounds: Bounds::from_points(&desc.vertices),
        }
    }

    pub fn vertices(&self) -> &[[f32; 3]] {
        &self.vertices
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn to_desc(&self) -> ConvexMeshDesc {
        ConvexMeshDesc::new(self.vertices.to_vec())
    }
}

/// Height samples on a regular grid, stored row-major
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeightFieldDesc {
    pub rows: u32,
    pub columns: u32,
    pub samples: Vec<i16>,
    /// Heights closer than this are treated as a flat edge
    pub convex_edge_threshold: f32,
}

impl HeightFieldDesc {
    pub fn new(rows: u32, columns: u32, samples: Vec<i16>) -> Self {
        Self {
            rows,
            columns,
            samples,
            convex_edge_threshold: 0.0,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.rows < 2 || self.columns < 2 {
            return Err(invalid(format!(
                "height field must be at least 2x2, got {}x{}",
                self.rows, self.columns
            )));
        }
        let expected = u64::from(self.rows) * u64::from(self.columns);
        if self.samples.len() as u64 != expected {
            return Err(invalid(format!(
                "height field expects {expected} samples, got {}",
                self.samples.len()
            )));
        }
        if !self.convex_edge_threshold.is_finite() || self.convex_edge_threshold < 0.0 {
            return Err(invalid("height field edge threshold must be finite and non-negative"));
        }
        Ok(())
    }
}

/// Immutable height field resource
#[derive(Debug, Clone, PartialEq)]
pub struct HeightField {
    rows: u32,
    columns: u32,
    samples: Box<[i16]>,
    convex_edge_threshold: f32,
}

impl HeightField {
    pub(crate) fn from_desc(desc: &HeightFieldDesc) -> Self {
        Self {
            rows: desc.rows,
            columns: desc.columns,
            samples: desc.samples.clone().into_boxed_slice(),
            convex_edge_threshold: desc.convex_edge_threshold,
        }
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn columns(&self) -> u32 {
        self.columns
    }

    pub fn convex_edge_threshold(&self) -> f32 {
        self.convex_edge_threshold
    }

    /// Sample at `(row, column)`, `None` outside the grid
    pub fn height(&self, row: u32, column: u32) -> Option<i16> {
        if row >= self.rows || column >= self.columns {
            return None;
        }
        let index = row as usize * self.columns as usize + column as usize;
        self.samples.get(index).copied()
    }

    /// Lowest and highest sample
    pub fn height_range(&self) -> (i16, i16) {
        self.samples
            .iter()
            .fold((i16::MAX, i16::MIN), |(lo, hi), s| (lo.min(*s), hi.max(*s)))
    }

    pub fn to_desc(&self) -> HeightFieldDesc {
        HeightFieldDesc {
            rows: self.rows,
            columns: self.columns,
            samples: self.samples.to_vec(),
            convex_edge_threshold: self.convex_edge_threshold,
        }
    }
}
