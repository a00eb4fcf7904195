//! kernel32 process and thread shims.
//!
//! Each shim reads its decoded arguments from the [`ApiContext`], updates the process
//! bookkeeping and reports failures to the guest the way Windows does: through the return
//! value and the calling thread's last-error. An `Err` from a shim always means the emulation
//! cannot continue.

use crate::{
    emulation::{
        runtime::{
            registry::{ApiRegistry, ApiShim},
            startupinfo::encode_startup_info,
            types::{ApiContext, ApiId, ApiReturn, Param, ParamKind},
        },
        CreationFlags, PseudoHandle, ThreadStart, Win32Error, MAX_SUSPEND_COUNT,
    },
    Error, Result,
};

/// `GetExitCodeThread` value for a thread that has not terminated.
pub const STILL_ACTIVE: u32 = 259;

/// Failure value of `SuspendThread` and `ResumeThread`.
const SUSPEND_FAILED: u64 = 0xFFFF_FFFF;

const NO_PARAMS: &[Param] = &[];
const EXIT_PROCESS: &[Param] = &[Param::new("uExitCode", ParamKind::Uint)];
const TERMINATE_PROCESS: &[Param] = &[
    Param::new("hProcess", ParamKind::Handle),
    Param::new("uExitCode", ParamKind::Uint),
];
const OPEN_PROCESS: &[Param] = &[
    Param::new("dwDesiredAccess", ParamKind::Dword),
    Param::new("bInheritHandle", ParamKind::Dword),
    Param::new("dwProcessId", ParamKind::Dword),
];
const IS_PROCESSOR_FEATURE_PRESENT: &[Param] =
    &[Param::new("ProcessorFeature", ParamKind::Dword)];
const GET_STARTUP_INFO: &[Param] = &[Param::new("lpStartupInfo", ParamKind::Pointer)];
const TLS_INDEX: &[Param] = &[Param::new("dwTlsIndex", ParamKind::Dword)];
const TLS_SET_VALUE: &[Param] = &[
    Param::new("dwTlsIndex", ParamKind::Dword),
    Param::new("lpTlsValue", ParamKind::Pointer),
];
const CREATE_THREAD: &[Param] = &[
    Param::new("lpThreadAttributes", ParamKind::Pointer),
    Param::new("dwStackSize", ParamKind::SizeT),
    Param::new("lpStartAddress", ParamKind::Pointer),
    Param::new("lpParameter", ParamKind::Pointer),
    Param::new("dwCreationFlags", ParamKind::Dword),
    Param::new("lpThreadId", ParamKind::Pointer),
];
const SET_LAST_ERROR: &[Param] = &[Param::new("dwErrCode", ParamKind::Dword)];
const THREAD_HANDLE: &[Param] = &[Param::new("hThread", ParamKind::Handle)];
const EXIT_THREAD: &[Param] = &[Param::new("dwExitCode", ParamKind::Dword)];
const GET_EXIT_CODE_THREAD: &[Param] = &[
    Param::new("hThread", ParamKind::Handle),
    Param::new("lpExitCode", ParamKind::Pointer),
];

/// Adds every shim of this module to `registry`.
pub fn register(registry: &mut ApiRegistry) {
    let shims = [
        ApiShim::new(ApiId::ExitProcess, EXIT_PROCESS, exit_process),
        ApiShim::new(ApiId::TerminateProcess, TERMINATE_PROCESS, terminate_process),
        ApiShim::new(ApiId::GetCurrentProcess, NO_PARAMS, get_current_process),
        ApiShim::new(ApiId::GetCurrentThread, NO_PARAMS, get_current_thread),
        ApiShim::new(ApiId::OpenProcess, OPEN_PROCESS, open_process),
        ApiShim::new(
            ApiId::IsProcessorFeaturePresent,
            IS_PROCESSOR_FEATURE_PRESENT,
            is_processor_feature_present,
        ),
        ApiShim::new(ApiId::GetStartupInfoA, GET_STARTUP_INFO, get_startup_info),
        ApiShim::new(ApiId::GetStartupInfoW, GET_STARTUP_INFO, get_startup_info),
        ApiShim::new(ApiId::GetCurrentThreadId, NO_PARAMS, get_current_thread_id),
        ApiShim::new(ApiId::GetCurrentProcessId, NO_PARAMS, get_current_process_id),
        ApiShim::new(ApiId::TlsAlloc, NO_PARAMS, tls_alloc),
        ApiShim::new(ApiId::TlsFree, TLS_INDEX, tls_free),
        ApiShim::new(ApiId::TlsGetValue, TLS_INDEX, tls_get_value),
        ApiShim::new(ApiId::TlsSetValue, TLS_SET_VALUE, tls_set_value),
        ApiShim::new(ApiId::CreateThread, CREATE_THREAD, create_thread),
        ApiShim::new(ApiId::GetLastError, NO_PARAMS, get_last_error),
        ApiShim::new(ApiId::SetLastError, SET_LAST_ERROR, set_last_error),
        ApiShim::new(ApiId::SuspendThread, THREAD_HANDLE, suspend_thread),
        ApiShim::new(ApiId::ResumeThread, THREAD_HANDLE, resume_thread),
        ApiShim::new(ApiId::ExitThread, EXIT_THREAD, exit_thread),
        ApiShim::new(ApiId::GetThreadId, THREAD_HANDLE, get_thread_id),
        ApiShim::new(ApiId::GetExitCodeThread, GET_EXIT_CODE_THREAD, get_exit_code_thread),
    ];

    for shim in shims {
        registry.register(shim);
    }
}

fn exit_process(ctx: &mut ApiContext<'_>) -> Result<ApiReturn> {
    let code = ctx.args.dword(0)?;
    ctx.state.exit_process(ctx.host, code);
    Ok(ApiReturn::Void)
}

fn terminate_process(ctx: &mut ApiContext<'_>) -> Result<ApiReturn> {
    let handle = ctx.args.get(0)?;
    let code = ctx.args.dword(1)?;
    ctx.state.terminate_process(ctx.host, handle, code);
    Ok(ApiReturn::Value(1))
}

fn get_current_process(ctx: &mut ApiContext<'_>) -> Result<ApiReturn> {
    Ok(ApiReturn::Value(
        ctx.state.pseudo_handle(PseudoHandle::CurrentProcess),
    ))
}

fn get_current_thread(ctx: &mut ApiContext<'_>) -> Result<ApiReturn> {
    Ok(ApiReturn::Value(
        ctx.state.pseudo_handle(PseudoHandle::CurrentThread),
    ))
}

fn open_process(ctx: &mut ApiContext<'_>) -> Result<ApiReturn> {
    log::debug!("OpenProcess for pid {:#x}", ctx.args.dword(2)?);
    Ok(ApiReturn::Value(
        ctx.state.pseudo_handle(PseudoHandle::OpenedProcess),
    ))
}

fn is_processor_feature_present(_ctx: &mut ApiContext<'_>) -> Result<ApiReturn> {
    Ok(ApiReturn::Value(1))
}

fn get_startup_info(ctx: &mut ApiContext<'_>) -> Result<ApiReturn> {
    let address = ctx.args.get(0)?;
    let block = encode_startup_info(&ctx.state.config().startup, ctx.width())?;
    ctx.host.write_guest_memory(address, &block)?;
    Ok(ApiReturn::Void)
}

fn get_current_thread_id(ctx: &mut ApiContext<'_>) -> Result<ApiReturn> {
    let id = ctx.state.threads().current_id()?;
    Ok(ApiReturn::Value(u64::from(id.0)))
}

fn get_current_process_id(ctx: &mut ApiContext<'_>) -> Result<ApiReturn> {
    Ok(ApiReturn::Value(u64::from(ctx.state.process_id())))
}

fn tls_alloc(ctx: &mut ApiContext<'_>) -> Result<ApiReturn> {
    let index = ctx.state.threads_mut().tls_alloc()?;
    Ok(ApiReturn::Value(u64::from(index)))
}

fn tls_free(ctx: &mut ApiContext<'_>) -> Result<ApiReturn> {
    let index = ctx.args.dword(0)?;
    let freed = ctx.state.threads_mut().tls_free(index)?;
    Ok(ApiReturn::from_bool(freed))
}

fn tls_get_value(ctx: &mut ApiContext<'_>) -> Result<ApiReturn> {
    let index = ctx.args.dword(0)?;
    let value = ctx.state.threads_mut().tls_get(index)?;
    Ok(ApiReturn::Value(value))
}

fn tls_set_value(ctx: &mut ApiContext<'_>) -> Result<ApiReturn> {
    let index = ctx.args.dword(0)?;
    let value = ctx.args.get(1)?;
    let stored = ctx.state.threads_mut().tls_set(index, value)?;
    Ok(ApiReturn::from_bool(stored))
}

fn create_thread(ctx: &mut ApiContext<'_>) -> Result<ApiReturn> {
    let start = ThreadStart {
        stack_size: ctx.args.get(1)?,
        entry_point: ctx.args.get(2)?,
        argument: ctx.args.get(3)?,
    };
    let flags = CreationFlags::from_bits_retain(ctx.args.dword(4)?);
    let thread_id_out = ctx.args.get(5)?;

    match ctx
        .state
        .create_thread(ctx.host, start, flags, thread_id_out)
    {
        Ok((_, handle)) => Ok(ApiReturn::Value(handle.raw())),
        Err(Error::ResourceExhausted(what)) => {
            log::warn!("CreateThread failed: {what} exhausted");
            ctx.fail(Win32Error::NotEnoughMemory, 0)
        }
        Err(err) => Err(err),
    }
}

fn get_last_error(ctx: &mut ApiContext<'_>) -> Result<ApiReturn> {
    let code = ctx.state.threads().current_thread()?.last_error();
    Ok(ApiReturn::Value(u64::from(code)))
}

fn set_last_error(ctx: &mut ApiContext<'_>) -> Result<ApiReturn> {
    let code = ctx.args.dword(0)?;
    ctx.set_last_error(code)?;
    Ok(ApiReturn::Void)
}

fn suspend_thread(ctx: &mut ApiContext<'_>) -> Result<ApiReturn> {
    let Some(id) = ctx.state.live_thread_for_handle(ctx.args.get(0)?) else {
        return ctx.fail(Win32Error::InvalidHandle, SUSPEND_FAILED);
    };

    match ctx.state.suspend_thread(ctx.host, id)? {
        Some(previous) => Ok(ApiReturn::Value(u64::from(previous))),
        None => {
            log::debug!("thread {id} already at suspend count {MAX_SUSPEND_COUNT:#x}");
            ctx.fail(Win32Error::SignalRefused, SUSPEND_FAILED)
        }
    }
}

fn resume_thread(ctx: &mut ApiContext<'_>) -> Result<ApiReturn> {
    let Some(id) = ctx.state.live_thread_for_handle(ctx.args.get(0)?) else {
        return ctx.fail(Win32Error::InvalidHandle, SUSPEND_FAILED);
    };

    let previous = ctx.state.resume_thread(ctx.host, id)?;
    Ok(ApiReturn::Value(u64::from(previous)))
}

fn exit_thread(ctx: &mut ApiContext<'_>) -> Result<ApiReturn> {
    let code = ctx.args.dword(0)?;
    ctx.state.exit_thread(ctx.host, code)?;
    Ok(ApiReturn::Void)
}

fn get_thread_id(ctx: &mut ApiContext<'_>) -> Result<ApiReturn> {
    match ctx.state.thread_for_handle(ctx.args.get(0)?) {
        Some(id) => Ok(ApiReturn::Value(u64::from(id.0))),
        None => ctx.fail(Win32Error::InvalidHandle, 0),
    }
}

fn get_exit_code_thread(ctx: &mut ApiContext<'_>) -> Result<ApiReturn> {
    let Some(id) = ctx.state.thread_for_handle(ctx.args.get(0)?) else {
        return ctx.fail(Win32Error::InvalidHandle, 0);
    };
    let address = ctx.args.get(1)?;

    let code = ctx
        .state
        .threads()
        .get(id)?
        .exit_code()
        .unwrap_or(STILL_ACTIVE);
    ctx.host.write_guest_memory(address, &code.to_le_bytes())?;
    Ok(ApiReturn::Value(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        emulation::{HostEngine, PointerWidth, ThreadId, ThreadState},
        test::{create_test_state, create_test_state_with, SCRATCH},
    };

    fn call(
        state: &mut crate::emulation::ProcessState,
        host: &mut crate::emulation::RecordingHost,
        api: ApiId,
        args: &[u64],
    ) -> ApiReturn {
        ApiRegistry::kernel32()
            .dispatch(api, state, host, args)
            .unwrap()
    }

    fn value(ret: ApiReturn) -> u64 {
        ret.value().unwrap()
    }

    fn last_error(state: &crate::emulation::ProcessState) -> u32 {
        state.threads().current_thread().unwrap().last_error()
    }

    #[test]
    fn test_identity() {
        let (mut state, mut host) = create_test_state();
        assert_eq!(value(call(&mut state, &mut host, ApiId::GetCurrentProcessId, &[])), 0x2005);
        assert_eq!(value(call(&mut state, &mut host, ApiId::GetCurrentThreadId, &[])), 1);
        assert_eq!(
            value(call(&mut state, &mut host, ApiId::GetCurrentProcess, &[])),
            0xFFFF_FFFF
        );
        assert_eq!(
            value(call(&mut state, &mut host, ApiId::GetCurrentThread, &[])),
            0xFFFF_FFFE
        );
        assert_eq!(
            value(call(&mut state, &mut host, ApiId::OpenProcess, &[0x1F0FFF, 0, 0x1234])),
            0xD10C
        );
        assert_eq!(
            value(call(&mut state, &mut host, ApiId::IsProcessorFeaturePresent, &[17])),
            1
        );
        assert!(state.handles().is_empty());
    }

    #[test]
    fn test_pseudo_handles_64() {
        let (mut state, mut host) = create_test_state_with(PointerWidth::Bits64);
        assert_eq!(
            value(call(&mut state, &mut host, ApiId::GetCurrentProcess, &[])),
            u64::MAX
        );
        assert_eq!(
            value(call(&mut state, &mut host, ApiId::GetCurrentThread, &[])),
            u64::MAX - 1
        );
    }

    #[test]
    fn test_exit_process() {
        let (mut state, mut host) = create_test_state();
        let ret = call(&mut state, &mut host, ApiId::ExitProcess, &[0x1_0000_0003]);
        assert_eq!(ret, ApiReturn::Void);
        assert!(host.is_halted());
        assert_eq!(state.exit_code(), Some(3));
    }

    #[test]
    fn test_terminate_process_foreign_handle() {
        let (mut state, mut host) = create_test_state();
        assert_eq!(value(call(&mut state, &mut host, ApiId::TerminateProcess, &[0xD10C, 1])), 1);
        assert!(!host.is_halted());
        assert_eq!(value(call(&mut state, &mut host, ApiId::TerminateProcess, &[0x40_0000, 2])), 1);
        assert!(host.is_halted());
        assert_eq!(state.exit_code(), Some(2));
    }

    #[test]
    fn test_get_startup_info() {
        for api in [ApiId::GetStartupInfoA, ApiId::GetStartupInfoW] {
            let (mut state, mut host) = create_test_state();
            assert_eq!(call(&mut state, &mut host, api, &[SCRATCH]), ApiReturn::Void);
            let block = host.read_guest_memory(SCRATCH, 0x44).unwrap();
            assert_eq!(&block[0..4], &[0x44, 0, 0, 0]);
            assert_eq!(&block[0x38..0x44], &[0xFF; 12]);
        }
    }

    #[test]
    fn test_get_startup_info_unmapped_is_fatal() {
        let (mut state, mut host) = create_test_state();
        let result = ApiRegistry::kernel32().dispatch(
            ApiId::GetStartupInfoA,
            &mut state,
            &mut host,
            &[0x10],
        );
        assert!(matches!(result, Err(Error::InvalidAddress { .. })));
    }

    #[test]
    fn test_tls_round_trip() {
        let (mut state, mut host) = create_test_state();
        let slot = value(call(&mut state, &mut host, ApiId::TlsAlloc, &[]));
        assert_eq!(slot, 0);
        assert_eq!(value(call(&mut state, &mut host, ApiId::TlsSetValue, &[slot, 42])), 1);
        assert_eq!(value(call(&mut state, &mut host, ApiId::TlsGetValue, &[slot])), 42);
        assert_eq!(last_error(&state), 0);
        assert_eq!(value(call(&mut state, &mut host, ApiId::TlsFree, &[slot])), 1);
        assert_eq!(value(call(&mut state, &mut host, ApiId::TlsGetValue, &[slot])), 0);
        assert_eq!(last_error(&state), 0x57);
        assert_eq!(value(call(&mut state, &mut host, ApiId::TlsFree, &[slot])), 0);
    }

    #[test]
    fn test_create_thread() {
        let (mut state, mut host) = create_test_state();
        let handle = value(call(
            &mut state,
            &mut host,
            ApiId::CreateThread,
            &[0, 0, 0x40_2000, 0xABCD, 0, SCRATCH],
        ));
        assert_eq!(handle, 1);
        assert_eq!(host.read_guest_memory(SCRATCH, 4).unwrap(), 2_u32.to_le_bytes());

        let thread = state.threads().get(ThreadId(2)).unwrap();
        assert_eq!(thread.state(), ThreadState::Ready);
        assert_eq!(thread.argument(), 0xABCD);
        assert_eq!(thread.stack_size(), 1024 * 1024);
        assert_eq!(value(call(&mut state, &mut host, ApiId::GetThreadId, &[handle])), 2);
    }

    #[test]
    fn test_create_thread_suspended_without_out_pointer() {
        let (mut state, mut host) = create_test_state();
        let handle = value(call(
            &mut state,
            &mut host,
            ApiId::CreateThread,
            &[0, 0x4000, 0x40_2000, 0, 0x4, 0],
        ));
        let id = state.thread_for_handle(handle).unwrap();
        assert_eq!(state.threads().get(id).unwrap().state(), ThreadState::Suspended);
        assert_eq!(value(call(&mut state, &mut host, ApiId::ResumeThread, &[handle])), 1);
        assert_eq!(state.threads().get(id).unwrap().state(), ThreadState::Ready);
    }

    #[test]
    fn test_create_thread_exhaustion() {
        let config = crate::emulation::EmulationConfig::default()
            .with_limits(crate::emulation::EmulationLimits::new().with_max_threads(1));
        let (mut state, mut host) = crate::test::create_test_state_from(config, PointerWidth::Bits32);

        let ret = call(&mut state, &mut host, ApiId::CreateThread, &[0, 0, 1, 0, 0, 0]);
        assert_eq!(value(ret), 0);
        assert_eq!(last_error(&state), 8);
    }

    #[test]
    fn test_last_error_per_thread() {
        let (mut state, mut host) = create_test_state();
        call(&mut state, &mut host, ApiId::SetLastError, &[0x1234]);
        assert_eq!(value(call(&mut state, &mut host, ApiId::GetLastError, &[])), 0x1234);

        call(&mut state, &mut host, ApiId::CreateThread, &[0, 0, 1, 0, 0, 0]);
        state.threads_mut().switch_to(ThreadId(2)).unwrap();
        assert_eq!(value(call(&mut state, &mut host, ApiId::GetLastError, &[])), 0);

        state.threads_mut().switch_to(ThreadId(1)).unwrap();
        assert_eq!(value(call(&mut state, &mut host, ApiId::GetLastError, &[])), 0x1234);
    }

    #[test]
    fn test_suspend_resume_invalid_handle() {
        let (mut state, mut host) = create_test_state();
        for api in [ApiId::SuspendThread, ApiId::ResumeThread] {
            call(&mut state, &mut host, ApiId::SetLastError, &[0]);
            assert_eq!(value(call(&mut state, &mut host, api, &[0x99])), 0xFFFF_FFFF);
            assert_eq!(last_error(&state), 6);
        }
    }

    #[test]
    fn test_suspend_limit() {
        let (mut state, mut host) = create_test_state();
        let handle = value(call(&mut state, &mut host, ApiId::CreateThread, &[0, 0, 1, 0, 0, 0]));
        for expected in 0..u64::from(MAX_SUSPEND_COUNT) {
            assert_eq!(value(call(&mut state, &mut host, ApiId::SuspendThread, &[handle])), expected);
        }
        assert_eq!(
            value(call(&mut state, &mut host, ApiId::SuspendThread, &[handle])),
            0xFFFF_FFFF
        );
        assert_eq!(last_error(&state), 156);
    }

    #[test]
    fn test_exit_thread_and_exit_code() {
        let (mut state, mut host) = create_test_state();
        let handle = value(call(&mut state, &mut host, ApiId::CreateThread, &[0, 0, 1, 0, 0, 0]));

        assert_eq!(
            value(call(&mut state, &mut host, ApiId::GetExitCodeThread, &[handle, SCRATCH])),
            1
        );
        assert_eq!(
            host.read_guest_memory(SCRATCH, 4).unwrap(),
            STILL_ACTIVE.to_le_bytes()
        );

        state.threads_mut().switch_to(ThreadId(2)).unwrap();
        assert_eq!(call(&mut state, &mut host, ApiId::ExitThread, &[0x2A]), ApiReturn::Void);
        state.threads_mut().switch_to(ThreadId(1)).unwrap();

        call(&mut state, &mut host, ApiId::GetExitCodeThread, &[handle, SCRATCH]);
        assert_eq!(host.read_guest_memory(SCRATCH, 4).unwrap(), 0x2A_u32.to_le_bytes());
        assert_eq!(value(call(&mut state, &mut host, ApiId::GetThreadId, &[handle])), 2);
        assert_eq!(value(call(&mut state, &mut host, ApiId::SuspendThread, &[handle])), 0xFFFF_FFFF);
        assert_eq!(state.threads().len(), 2);
    }

    #[test]
    fn test_get_thread_id_pseudo_and_invalid() {
        let (mut state, mut host) = create_test_state();
        assert_eq!(
            value(call(&mut state, &mut host, ApiId::GetThreadId, &[0xFFFF_FFFE])),
            1
        );
        assert_eq!(
            value(call(&mut state, &mut host, ApiId::GetThreadId, &[0xFFFF_FFFF])),
            0
        );
        assert_eq!(last_error(&state), 6);
        assert_eq!(
            value(call(&mut state, &mut host, ApiId::GetExitCodeThread, &[0x55, SCRATCH])),
            0
        );
    }
}
