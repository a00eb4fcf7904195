//! Emulation configuration types.
//!
//! Configuration controls the identity of the emulated process, the resource limits of the
//! bookkeeping tables, thread defaults, the values reported through the startup information
//! block, and call tracing.
//!
//! # Overview
//!
//! - [`EmulationConfig`] - Top-level configuration container
//! - [`ProcessConfig`] - Process id, image base and sentinel handle values
//! - [`EmulationLimits`] - Thread, handle and TLS limits
//! - [`ThreadConfig`] - Thread id numbering and default stack size
//! - [`StartupInfoConfig`] - Values written by `GetStartupInfoA`/`GetStartupInfoW`
//! - [`TracingConfig`] - Logging options
//!
//! # Configuration Presets
//!
//! - [`EmulationConfig::x86()`] - 32-bit guest image (the default)
//! - [`EmulationConfig::x64()`] - 64-bit guest image
//! - [`EmulationConfig::minimal()`] - Small limits for short-lived test runs
//!
//! # Example
//!
//! ```rust
//! use procthreads::emulation::{EmulationConfig, EmulationLimits};
//!
//! let config = EmulationConfig {
//!     limits: EmulationLimits::new().with_max_threads(8).with_max_tls_slots(64),
//!     ..EmulationConfig::x64()
//! };
//! assert_eq!(config.process.image_base, 0x1_4000_0000);
//! ```

/// Comprehensive emulation configuration.
///
/// # Default Configuration
///
/// The default is [`EmulationConfig::x86()`]:
/// - process id 0x2005, image base 0x400000
/// - 1024 threads, 65536 handles, 1088 TLS slots per thread
/// - 1 MB default stack, thread ids starting at 1
/// - call tracing disabled
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmulationConfig {
    /// Identity of the emulated process.
    pub process: ProcessConfig,

    /// Resource limits of the bookkeeping tables.
    pub limits: EmulationLimits,

    /// Thread defaults.
    pub threads: ThreadConfig,

    /// Values reported through the startup information block.
    pub startup: StartupInfoConfig,

    /// Logging and tracing configuration.
    pub tracing: TracingConfig,
}

/// Identity of the emulated process.
///
/// # Default Values
///
/// | Setting | Default Value |
/// |---------|---------------|
/// | `process_id` | 0x2005 |
/// | `image_base` | 0x400000 |
/// | `open_process_handle` | 0xD10C |
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessConfig {
    /// Value returned by `GetCurrentProcessId`.
    pub process_id: u32,

    /// Load address of the main image.
    ///
    /// Guests sometimes pass their own module handle to `TerminateProcess`, so this value is
    /// treated as naming the current process.
    pub image_base: u64,

    /// Handle value returned by every `OpenProcess` call.
    pub open_process_handle: u64,
}

/// Limits for the bookkeeping tables.
///
/// When a limit is reached the corresponding API reports failure to the guest
/// (`CreateThread` returns NULL, `TlsAlloc` returns `TLS_OUT_OF_INDEXES`).
///
/// # Builder Pattern
///
/// ```rust
/// use procthreads::emulation::EmulationLimits;
///
/// let limits = EmulationLimits::new()
///     .with_max_threads(4)
///     .with_max_handles(16)
///     .with_max_tls_slots(64);
/// assert_eq!(limits.max_threads, 4);
/// ```
///
/// # Default Values
///
/// | Limit | Default Value |
/// |-------|---------------|
/// | `max_threads` | 1,024 |
/// | `max_handles` | 65,536 |
/// | `max_tls_slots` | 1,088 |
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmulationLimits {
    /// Maximum threads alive at the same time. Terminated threads do not count.
    pub max_threads: usize,

    /// Maximum handles over the lifetime of the process.
    pub max_handles: usize,

    /// Maximum TLS indices each thread may allocate (`TLS_MINIMUM_AVAILABLE` plus the
    /// expansion slots on current Windows).
    pub max_tls_slots: u32,
}

/// Thread defaults.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThreadConfig {
    /// Id of the first thread. Later threads count up from here.
    pub first_thread_id: u32,

    /// Stack size used when `CreateThread` is passed 0.
    pub default_stack_size: u64,
}

/// Values written into the startup information block.
///
/// The defaults describe a visible console window of 100x100 pixels with a 132x128 character
/// buffer, which is what typical guests check for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StartupInfoConfig {
    /// `lpDesktop` pointer value.
    pub desktop: u64,
    /// `lpTitle` pointer value.
    pub title: u64,
    /// `dwX`
    pub x: u32,
    /// `dwY`
    pub y: u32,
    /// `dwXSize`
    pub x_size: u32,
    /// `dwYSize`
    pub y_size: u32,
    /// `dwXCountChars`
    pub x_count_chars: u32,
    /// `dwYCountChars`
    pub y_count_chars: u32,
    /// `dwFillAttribute`
    pub fill_attribute: u32,
    /// `dwFlags`
    pub flags: u32,
    /// `wShowWindow`
    pub show_window: u16,
}

/// Tracing and logging configuration.
///
/// All output goes through the `log` facade; these switches only decide which events are
/// emitted at all.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TracingConfig {
    /// Log every dispatched call with its arguments and return value at `trace` level.
    pub trace_calls: bool,

    /// Log fatal dispatch errors at `warn` level before returning them.
    pub trace_errors: bool,
}

impl Default for EmulationConfig {
    fn default() -> Self {
        Self::x86()
    }
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            process_id: 0x2005,
            image_base: 0x40_0000,
            open_process_handle: 0xD10C,
        }
    }
}

impl Default for EmulationLimits {
    fn default() -> Self {
        Self {
            max_threads: 1024,
            max_handles: 65_536,
            max_tls_slots: 1088,
        }
    }
}

impl Default for ThreadConfig {
    fn default() -> Self {
        Self {
            first_thread_id: 1,
            default_stack_size: 1024 * 1024, // 1 MB
        }
    }
}

impl Default for StartupInfoConfig {
    fn default() -> Self {
        Self {
            desktop: 0xC3_C930,
            title: 0,
            x: 0,
            y: 0,
            x_size: 0x64,
            y_size: 0x64,
            x_count_chars: 0x84,
            y_count_chars: 0x80,
            fill_attribute: 0xFF,
            flags: 0x40,
            show_window: 1,
        }
    }
}

impl EmulationConfig {
    /// Configuration for a 32-bit guest image.
    #[must_use]
    pub fn x86() -> Self {
        Self {
            process: ProcessConfig::default(),
            limits: EmulationLimits::default(),
            threads: ThreadConfig::default(),
            startup: StartupInfoConfig::default(),
            tracing: TracingConfig {
                trace_calls: false,
                trace_errors: true,
            },
        }
    }

    /// Configuration for a 64-bit guest image.
    #[must_use]
    pub fn x64() -> Self {
        Self {
            process: ProcessConfig {
                image_base: 0x1_4000_0000,
                ..Default::default()
            },
            ..Self::x86()
        }
    }

    /// Small limits and no tracing, for short runs.
    #[must_use]
    pub fn minimal() -> Self {
        Self {
            limits: EmulationLimits {
                max_threads: 16,
                max_handles: 256,
                max_tls_slots: 64,
            },
            threads: ThreadConfig {
                default_stack_size: 64 * 1024,
                ..Default::default()
            },
            tracing: TracingConfig::default(),
            ..Self::x86()
        }
    }

    /// Replaces the process identity.
    #[must_use]
    pub fn with_process(mut self, process: ProcessConfig) -> Self {
        self.process = process;
        self
    }

    /// Replaces the limits.
    #[must_use]
    pub fn with_limits(mut self, limits: EmulationLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Replaces the thread defaults.
    #[must_use]
    pub fn with_threads(mut self, threads: ThreadConfig) -> Self {
        self.threads = threads;
        self
    }

    /// Replaces the startup information values.
    #[must_use]
    pub fn with_startup(mut self, startup: StartupInfoConfig) -> Self {
        self.startup = startup;
        self
    }

    /// Replaces the tracing options.
    #[must_use]
    pub fn with_tracing(mut self, tracing: TracingConfig) -> Self {
        self.tracing = tracing;
        self
    }
}

impl ProcessConfig {
    /// Sets the process id.
    #[must_use]
    pub fn with_process_id(mut self, process_id: u32) -> Self {
        self.process_id = process_id;
        self
    }

    /// Sets the image base.
    #[must_use]
    pub fn with_image_base(mut self, image_base: u64) -> Self {
        self.image_base = image_base;
        self
    }
}

impl EmulationLimits {
    /// Creates the default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum number of threads.
    #[must_use]
    pub fn with_max_threads(mut self, max: usize) -> Self {
        self.max_threads = max;
        self
    }

    /// Sets the maximum number of handles.
    #[must_use]
    pub fn with_max_handles(mut self, max: usize) -> Self {
        self.max_handles = max;
        self
    }

    /// Sets the per-thread TLS index limit.
    #[must_use]
    pub fn with_max_tls_slots(mut self, max: u32) -> Self {
        self.max_tls_slots = max;
        self
    }
}

impl TracingConfig {
    /// Every event enabled.
    #[must_use]
    pub fn verbose() -> Self {
        Self {
            trace_calls: true,
            trace_errors: true,
        }
    }
}
