//! The foundation - initialization context created before anything else
//!
//! A [`Foundation`] bundles the allocation gateway, the diagnostic channel and
//! the frozen type registry. It is threaded explicitly into every factory
//! instead of living in global state, but the process still gets at most one:
//! creating a second while the first is alive fails.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use keel_core::{
    DiagnosticChannel, ErrorCallback, LogErrorCallback, SourceLocation, TypeRegistry,
    TypeRegistryBuilder, TypeRegistryError,
};
use keel_memory::{AllocationGateway, AllocatorCallback, DefaultAllocator};

use crate::config::FoundationDesc;
use crate::error::{PhysicsError, Result};

static FOUNDATION_LIVE: AtomicBool = AtomicBool::new(false);

/// Process-unique initialization context
pub struct Foundation {
    diagnostics: Arc<DiagnosticChannel>,
    gateway: Arc<AllocationGateway>,
    registry: Arc<TypeRegistry>,
}

impl Foundation {
    /// Install the host callbacks and build the type registry
    #[track_caller]
    pub fn create(
        desc: FoundationDesc,
        allocator: Box<dyn AllocatorCallback>,
        error_callback: Arc<dyn ErrorCallback>,
    ) -> Result<Arc<Self>> {
        let location = SourceLocation::caller();
        let diagnostics = Arc::new(DiagnosticChannel::new(error_callback));

        if FOUNDATION_LIVE
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            let error = PhysicsError::FoundationExists;
            diagnostics.report(error.severity(), &error.to_string(), location);
            return Err(error);
        }

        let registry = match build_registry(&diagnostics, location, register_builtin_types) {
            Ok(registry) => registry,
            Err(error) => {
                FOUNDATION_LIVE.store(false, Ordering::Release);
                return Err(error);
            }
        };

        let gateway = Arc::new(AllocationGateway::new(
            allocator,
            diagnostics.clone(),
            desc.report_allocation_names,
        ));

        log::info!(
            "Foundation created with {} registered object types",
            registry.len()
        );

        Ok(Arc::new(Self {
            diagnostics,
            gateway,
            registry: Arc::new(registry),
        }))
    }

    /// Foundation with the system allocator and `log`-backed diagnostics
    #[track_caller]
    pub fn with_defaults() -> Result<Arc<Self>> {
        Self::create(
            FoundationDesc::default(),
            Box::new(DefaultAllocator),
            Arc::new(LogErrorCallback),
        )
    }

    /// Explicitly shut down, handing the foundation back if it is still shared
    #[track_caller]
    pub fn shutdown(this: Arc<Self>) -> std::result::Result<(), Arc<Self>> {
        match Arc::try_unwrap(this) {
            Ok(foundation) => {
                drop(foundation);
                Ok(())
            }
            Err(this) => {
                let error = PhysicsError::FoundationInUse(Arc::strong_count(&this) - 1);
                this.diagnostics
                    .report(error.severity(), &error.to_string(), SourceLocation::caller());
                Err(this)
            }
        }
    }

    /// Whether a foundation currently exists in this process
    pub fn is_live() -> bool {
        FOUNDATION_LIVE.load(Ordering::Acquire)
    }

    pub fn diagnostics(&self) -> &Arc<DiagnosticChannel> {
        &self.diagnostics
    }

    pub fn gateway(&self) -> &Arc<AllocationGateway> {
        &self.gateway
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }
}

impl Drop for Foundation {
    fn drop(&mut self) {
        FOUNDATION_LIVE.store(false, Ordering::Release);
        log::info!("Foundation shut down");
    }
}

impl fmt::Debug for Foundation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Foundation")
            .field("gateway", &self.gateway)
            .field("registry", &self.registry)
            .finish()
    }
}

fn register_builtin_types(
    builder: &mut TypeRegistryBuilder,
) -> std::result::Result<(), TypeRegistryError> {
    *builder = TypeRegistry::builtin_builder()?;
    Ok(())
}

/// Run type registration, reporting a failure once at abort severity
fn build_registry(
    diagnostics: &DiagnosticChannel,
    location: SourceLocation,
    register: impl FnOnce(&mut TypeRegistryBuilder) -> std::result::Result<(), TypeRegistryError>,
) -> Result<TypeRegistry> {
    let mut builder = TypeRegistry::builder();
    match register(&mut builder) {
        Ok(()) => Ok(builder.build()),
        Err(error) => {
            let error = PhysicsError::from(error);
            diagnostics.report(error.severity(), &error.to_string(), location);
            Err(error)
        }
    }
}
