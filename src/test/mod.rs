use crate::emulation::{
    EmulationConfig, EmulationProcess, PointerWidth, ProcessState, RecordingHost, ThreadStart,
};

/// Guest address of a mapped scratch page for out-parameters.
pub const SCRATCH: u64 = 0x1_0000;

/// Entry point used for the main thread of test processes.
pub const MAIN_ENTRY: u64 = 0x40_1000;

// Helper function to create a host with the scratch page mapped
pub fn create_test_host(width: PointerWidth) -> RecordingHost {
    let mut host = RecordingHost::new(width);
    host.map(SCRATCH, 0x1000);
    host
}

// Helper function to create process state whose main thread is current and bound to the
// host's primary context
pub fn create_test_state_from(
    config: EmulationConfig,
    width: PointerWidth,
) -> (ProcessState, RecordingHost) {
    let host = create_test_host(width);
    let mut state = ProcessState::new(config, &host);

    let threads = state.threads_mut();
    let main = threads
        .create(
            ThreadStart {
                entry_point: MAIN_ENTRY,
                argument: 0,
                stack_size: 0x10_0000,
            },
            false,
        )
        .unwrap();
    threads.bind_context(main, host.primary_context()).unwrap();
    threads.switch_to(main).unwrap();

    (state, host)
}

pub fn create_test_state_with(width: PointerWidth) -> (ProcessState, RecordingHost) {
    create_test_state_from(EmulationConfig::default(), width)
}

pub fn create_test_state() -> (ProcessState, RecordingHost) {
    create_test_state_with(PointerWidth::Bits32)
}

// Helper function to create a started 32-bit process
pub fn create_test_process() -> EmulationProcess<RecordingHost> {
    let host = create_test_host(PointerWidth::Bits32);
    let primary = host.primary_context();
    let mut process = EmulationProcess::new(host, EmulationConfig::default());
    process.start(MAIN_ENTRY, primary).unwrap();
    process
}
