use crate::proc::{self, myproc, SendSignalError};
use crate::signal::{Disposition, SignalKind, SignalValue};
use crate::syscall::syscall::{argaddr, argint};

pub(crate) fn sys_fork() -> u64 {
    match proc::fork() {
        Some(pid) => pid as u64,
        None => u64::MAX,
    }
}

pub(crate) fn sys_exit() -> u64 {
    let status = argint(0);
    proc::exit(status);
}

pub(crate) fn sys_wait() -> u64 {
    let addr = argaddr(0);
    proc::wait(addr) as u64
}

pub(crate) fn sys_getpid() -> u64 {
    myproc().pid as u64
}

pub(crate) fn sys_kill() -> u64 {
    let pid = argint(0) as u32;
    proc::kill(pid) as i64 as u64
}

pub(crate) fn sys_yield() -> u64 {
    proc::proc_yield();
    0
}

pub(crate) fn sys_sbrk() -> u64 {
    let n = argint(0);
    let addr = myproc().sz;
    if proc::growproc(n) < 0 {
        return u64::MAX;
    }
    addr as u64
}

// a0: receiver pid, a1: kind index (0 = Alarm, 1 = Message, 2 = Kill), a2: payload.
pub(crate) fn sys_send_signal() -> u64 {
    let receiver_pid = argint(0) as u32;
    let kind_index = argint(1) as usize;
    let payload = argaddr(2) as u64;

    let kind = match SignalKind::from_index(kind_index) {
        Some(kind) => kind,
        None => return u64::MAX,
    };

    let sender_pid = myproc().pid;
    let value = SignalValue { kind, sender_pid, payload };

    match proc::send_signal(value, receiver_pid) {
        Ok(()) => 0,
        Err(SendSignalError::QueueFull) => 1,
        Err(SendSignalError::NotFound) => 2,
    }
}

// a0: kind index, a1: handler entry address in the caller's address
// space, or 0 to restore the default (ignore) disposition.
pub(crate) fn sys_set_signal_handler() -> u64 {
    let kind_index = argint(0) as usize;
    let handler = argaddr(1);

    let disposition = if handler == 0 {
        Disposition::Ignore
    } else {
        Disposition::User(handler)
    };

    proc::set_signal_handler(kind_index, disposition) as i64 as u64
}

pub(crate) fn sys_alarm() -> u64 {
    let seconds = argint(0) as u32;
    proc::alarm(seconds) as u64
}
