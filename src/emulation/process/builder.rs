//! Fluent construction of [`EmulationProcess`] instances.

use crate::{
    emulation::{
        process::{EmulationConfig, EmulationLimits, EmulationProcess, TracingConfig},
        runtime::ApiRegistry,
        HostEngine,
    },
    Result,
};

/// Builder for [`EmulationProcess`].
///
/// A host engine is required; everything else has defaults (the configuration of
/// [`EmulationConfig::default`] and the full kernel32 dispatch table).
///
/// # Example
///
/// ```rust
/// use procthreads::emulation::{PointerWidth, ProcessBuilder, RecordingHost};
///
/// let process = ProcessBuilder::new()
///     .name("sample.exe")
///     .host(RecordingHost::new(PointerWidth::Bits64))
///     .for_x64()
///     .max_threads(8)
///     .trace_calls()
///     .build()?;
/// assert_eq!(process.name(), "sample.exe");
/// assert_eq!(process.config().limits.max_threads, 8);
/// # Ok::<(), procthreads::Error>(())
/// ```
#[derive(Debug)]
pub struct ProcessBuilder<H: HostEngine> {
    name: Option<String>,
    host: Option<H>,
    config: EmulationConfig,
    registry: Option<ApiRegistry>,
}

impl<H: HostEngine> Default for ProcessBuilder<H> {
    fn default() -> Self {
        Self {
            name: None,
            host: None,
            config: EmulationConfig::default(),
            registry: None,
        }
    }
}

impl<H: HostEngine> ProcessBuilder<H> {
    /// Creates a builder with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the process name used in log output.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the host engine.
    #[must_use]
    pub fn host(mut self, host: H) -> Self {
        self.host = Some(host);
        self
    }

    /// Replaces the whole configuration.
    #[must_use]
    pub fn config(mut self, config: EmulationConfig) -> Self {
        self.config = config;
        self
    }

    /// Uses the [`EmulationConfig::x86`] preset.
    #[must_use]
    pub fn for_x86(self) -> Self {
        self.config(EmulationConfig::x86())
    }

    /// Uses the [`EmulationConfig::x64`] preset.
    #[must_use]
    pub fn for_x64(self) -> Self {
        self.config(EmulationConfig::x64())
    }

    /// Replaces the limits.
    #[must_use]
    pub fn limits(mut self, limits: EmulationLimits) -> Self {
        self.config.limits = limits;
        self
    }

    /// Sets the thread limit.
    #[must_use]
    pub fn max_threads(mut self, max: usize) -> Self {
        self.config.limits.max_threads = max;
        self
    }

    /// Sets the process id reported to the guest.
    #[must_use]
    pub fn process_id(mut self, process_id: u32) -> Self {
        self.config.process.process_id = process_id;
        self
    }

    /// Sets the image base of the main module.
    #[must_use]
    pub fn image_base(mut self, image_base: u64) -> Self {
        self.config.process.image_base = image_base;
        self
    }

    /// Enables per-call tracing.
    #[must_use]
    pub fn trace_calls(mut self) -> Self {
        self.config.tracing = TracingConfig::verbose();
        self
    }

    /// Uses a custom dispatch table instead of the kernel32 one.
    #[must_use]
    pub fn registry(mut self, registry: ApiRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Builds the process.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Invariant`] if no host engine was set.
    pub fn build(self) -> Result<EmulationProcess<H>> {
        let host = self
            .host
            .ok_or_else(|| invariant_error!("ProcessBuilder requires a host engine"))?;
        let registry = self.registry.unwrap_or_else(ApiRegistry::kernel32);

        let mut process = EmulationProcess::with_registry(host, self.config, registry);
        if let Some(name) = self.name {
            process.name = name;
        }
        log::debug!("built process {:?}", process);
        Ok(process)
    }
}
