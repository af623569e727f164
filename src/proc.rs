use core::mem;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::file::{File, INode};
use crate::file::file::filedup;
use crate::fs::fs;
use crate::kalloc::KMEM;
use crate::KSTACK;
use crate::memlayout::{SIGNALRET, SIGNALSTACK, TRAMPOLINE, TRAPFRAME};
use crate::param::{MAXPROCNAME, NCPU, NOFILE, NPROC, ROOTDEV, TICK_RATE};
use crate::printf;
use crate::riscv::{intr_get, intr_on, PageTable, PGSIZE, PTE_R, PTE_U, PTE_W, PTE_X, r_tp};
use crate::signal::{Disposition, SignalKind, SignalValue, Signaling, SIGNAL_CATCHABLE_COUNT};
use crate::spinlock::{pop_off, push_off, Spinlock};
use crate::string::{memmove, memset, safestrcpy};
use crate::trap::{ticks, usertrapret};
use crate::vm::{copyin, copyout, mappages, uvmalloc, uvmcopy, uvmcreate, uvmdealloc, uvmfirst, uvmfree, uvmunmap};

// Saved registers for kernel context switches.
#[derive(Copy, Clone)]
struct Context {
    ra: u64,
    sp: u64,

    // callee-saved
    s0: u64,
    s1: u64,
    s2: u64,
    s3: u64,
    s4: u64,
    s5: u64,
    s6: u64,
    s7: u64,
    s8: u64,
    s9: u64,
    s10: u64,
    s11: u64,
}

impl Context {
    const fn zero() -> Self {
        Context {
            ra: 0,
            sp: 0,
            s0: 0,
            s1: 0,
            s2: 0,
            s3: 0,
            s4: 0,
            s5: 0,
            s6: 0,
            s7: 0,
            s8: 0,
            s9: 0,
            s10: 0,
            s11: 0,
        }
    }
}

extern "C" {
    // defined in switch.S; saves the caller's callee-saved registers into
    // `old`, then loads the same set from `new`.
    fn swtch(old: *mut Context, new: *mut Context);
}

// Per-CPU state.
#[derive(Copy, Clone)]
pub struct Cpu {
    proc: Option<*mut Proc>,
    // The process running on this cpu, or None.
    context: Context,
    // swtch() here to enter scheduler().
    pub noff: u8,
    // Depth of push_off() nesting.
    pub intena: bool, // Were interrupts enabled before push_off()?
}

impl Cpu {
    const fn default() -> Self {
        Cpu {
            proc: None,
            context: Context::zero(),
            noff: 0,
            intena: false,
        }
    }
}

static mut CPUS: [Cpu; NCPU] = [Cpu::default(); NCPU];
static mut PROCS: [Proc; NPROC] = [Proc::default(); NPROC];

static mut INIT_PROC: Option<*mut Proc> = None;

extern {
    static trampoline: u8; // trampoline.S
    // stub a signal handler's `ra` is pointed at, so that returning from a
    // handler re-enters the kernel through `yield` instead of falling off
    // into whatever was on the user stack. Lives alongside trampoline in
    // trampoline.S.
    static signalret: u8;
}

// per-process data for the trap handling code in trampoline.S.
// sits in a page by itself just under the trampoline page in the
// user page table. not specially mapped in the kernel page table.
// uservec in trampoline.S saves user registers in the trapframe,
// then initializes registers from the trapframe's
// kernel_sp, kernel_hartid, kernel_satp, and jumps to kernel_trap.
// usertrapret() and userret in trampoline.S set up
// the trapframe's kernel_*, restore user registers from the
// trapframe, switch to the user page table, and enter user space.
// the trapframe includes callee-saved user registers like s0-s11 because the
// return-to-user path via usertrapret() doesn't return through
// the entire kernel call stack.
#[derive(Copy, Clone)]
pub struct Trapframe {
    /*   0 */ pub kernel_satp: u64,
    // kernel page table
    /*   8 */ pub kernel_sp: u64,
    // top of process's kernel stack
    /*  16 */ pub kernel_trap: u64,
    // usertrap()
    /*  24 */ pub epc: u64,
    // saved user program counter
    /*  32 */ pub kernel_hartid: u64,
    // saved kernel tp
    /*  40 */ pub ra: u64,
    /*  48 */ pub sp: u64,
    /*  56 */ pub gp: u64,
    /*  64 */ pub tp: u64,
    /*  72 */ pub t0: u64,
    /*  80 */ pub t1: u64,
    /*  88 */ pub t2: u64,
    /*  96 */ pub s0: u64,
    /* 104 */ pub s1: u64,
    /* 112 */ pub a0: u64,
    /* 120 */ pub a1: u64,
    /* 128 */ pub a2: u64,
    /* 136 */ pub a3: u64,
    /* 144 */ pub a4: u64,
    /* 152 */ pub a5: u64,
    /* 160 */ pub a6: u64,
    /* 168 */ pub a7: u64,
    /* 176 */ pub s2: u64,
    /* 184 */ pub s3: u64,
    /* 192 */ pub s4: u64,
    /* 200 */ pub s5: u64,
    /* 208 */ pub s6: u64,
    /* 216 */ pub s7: u64,
    /* 224 */ pub s8: u64,
    /* 232 */ pub s9: u64,
    /* 240 */ pub s10: u64,
    /* 248 */ pub s11: u64,
    /* 256 */ pub t3: u64,
    /* 264 */ pub t4: u64,
    /* 272 */ pub t5: u64,
    /* 280 */ pub t6: u64,
}

impl Trapframe {
    const fn zeroed() -> Self {
        Trapframe {
            kernel_satp: 0,
            kernel_sp: 0,
            kernel_trap: 0,
            epc: 0,
            kernel_hartid: 0,
            ra: 0,
            sp: 0,
            gp: 0,
            tp: 0,
            t0: 0,
            t1: 0,
            t2: 0,
            s0: 0,
            s1: 0,
            a0: 0,
            a1: 0,
            a2: 0,
            a3: 0,
            a4: 0,
            a5: 0,
            a6: 0,
            a7: 0,
            s2: 0,
            s3: 0,
            s4: 0,
            s5: 0,
            s6: 0,
            s7: 0,
            s8: 0,
            s9: 0,
            s10: 0,
            s11: 0,
            t3: 0,
            t4: 0,
            t5: 0,
            t6: 0,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Procstate { UNUSED, USED, SLEEPING, RUNNABLE, RUNNING, ZOMBIE }

// Per-process state
#[derive(Copy, Clone)]
pub struct Proc {
    pub(crate) lock: Spinlock,

    // p->lock must be held when using these:
    pub(crate) state: Procstate, // Process state
    chan: Option<usize>, // If set, sleeping on this channel address
    killed: u8, // If non-zero, have been killed
    pub(crate) xstate: u8, // Exit status to be returned to parent's wait
    pub pid: u32, // Process ID

    // wait_lock must be held when using this:
    pub(crate) parent: Option<*mut Proc>, // Parent process

    // these are private to the process, so p->lock need not be held.
    pub(crate) kstack: usize, // Virtual address of kernel stack
    pub(crate) sz: usize, // Size of process memory (bytes)
    pub(crate) pagetable: Option<*mut PageTable>, // User page table
    pub(crate) trapframe: Option<*mut Trapframe>, // data page for trampoline.S
    context: Context, // swtch() here to run process
    pub(crate) ofile: [Option<*mut File<'static>>; NOFILE], // Open files
    pub(crate) cwd: Option<*mut INode>, // Current directory
    pub name: [u8; MAXPROCNAME], // Process name (debugging)

    // p->lock must be held when touching the queue or handlers; the alarm
    // fields are only ever read/written by this process's own syscalls and
    // by the scheduler while it holds p->lock.
    pub(crate) signaling: Signaling,
    alarm_set: bool,
    cycles_at_alarm: u64,
}

impl Proc {
    const fn default() -> Self {
        Proc {
            lock: Spinlock::init_lock("proc"),
            state: Procstate::UNUSED,
            chan: None,
            killed: 0,
            xstate: 0,
            pid: 0,
            parent: None,
            kstack: 0,
            sz: 0,
            pagetable: None,
            trapframe: None,
            context: Context::zero(),
            ofile: [None; NOFILE],
            cwd: None,
            name: [0; MAXPROCNAME],
            signaling: Signaling::new(),
            alarm_set: false,
            cycles_at_alarm: 0,
        }
    }
}

static NEXT_PID: AtomicU32 = AtomicU32::new(1);
// helps ensure that wakeups of wait()ing
// parents are not lost. helps obey the
// memory model when using p->parent.
// must be acquired before any p->lock.
static mut WAIT_LOCK: Spinlock = Spinlock::init_lock("wait_lock");

// Must be called with interrupts disabled,
// to prevent race with process being moved
// to a different CPU.
pub fn cpuid() -> usize {
    r_tp() as usize
}

// Return this CPU's cpu struct.
// Interrupts must be disabled.
pub fn mycpu() -> &'static mut Cpu {
    unsafe { &mut CPUS[cpuid()] }
}

fn current_proc_ptr() -> Option<*mut Proc> {
    push_off();
    let c = mycpu();
    let p = c.proc;
    pop_off();
    p
}

// Return the currently-running process. Panics if called with no process
// scheduled on this cpu (e.g. from the idle scheduler loop itself).
pub fn myproc() -> &'static mut Proc {
    let p = current_proc_ptr().expect("myproc: no process scheduled on this cpu");
    unsafe { &mut *p }
}

fn allocpid() -> u32 {
    NEXT_PID.fetch_add(1, Ordering::Relaxed)
}

// Allocate a page for each process's kernel stack.
// Map it high in memory, followed by an invalid
// guard page.
pub fn proc_mapstacks(kpgtbl: &mut PageTable) {
    for idx in 0..NPROC {
        unsafe {
            let pa: *mut u8 = KMEM.kalloc();
            if pa.is_null() {
                panic!("kalloc");
            }
            let va = KSTACK!(idx);
            kvmmap_stack(kpgtbl, va, pa.expose_provenance());
            PROCS[idx].kstack = va;
        }
    }
}

fn kvmmap_stack(kpgtbl: &mut PageTable, va: usize, pa: usize) {
    crate::vm::kvmmap(kpgtbl, va, pa, PGSIZE, PTE_R | PTE_W);
}

// initialize the proc table.
pub fn procinit() {
    // empty: PROCS, WAIT_LOCK and the pid counter are already initialized
    // as part of their static declarations.
}

// a user program that calls exec("/init")
// assembled from ../user/initcode.S
// od -t xC ../user/initcode
const initcode: [u8; 52] = [
    0x17, 0x05, 0x00, 0x00, 0x13, 0x05, 0x45, 0x02,
    0x97, 0x05, 0x00, 0x00, 0x93, 0x85, 0x35, 0x02,
    0x93, 0x08, 0x70, 0x00, 0x73, 0x00, 0x00, 0x00,
    0x93, 0x08, 0x20, 0x00, 0x73, 0x00, 0x00, 0x00,
    0xef, 0xf0, 0x9f, 0xff, 0x2f, 0x69, 0x6e, 0x69,
    0x74, 0x00, 0x00, 0x24, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00
];

// Set up first user process.
pub fn userinit() {
    let p = allocproc().expect("userinit: allocproc failed");
    unsafe { INIT_PROC = Some(p as *mut Proc); }

    // allocate one user page and copy initcode's instructions
    // and data into it.
    let pagetable = unsafe { &mut *p.pagetable.unwrap() };
    uvmfirst(pagetable, initcode.as_ptr(), initcode.len());
    p.sz = PGSIZE;

    // prepare for the very first "return" from kernel to user.
    let tf = unsafe { &mut *p.trapframe.unwrap() };
    tf.epc = 0; // user program counter
    tf.sp = PGSIZE as u64; // user stack pointer

    safestrcpy(&mut p.name, b"initcode", MAXPROCNAME);
    p.cwd = fs::namei(b"/").map(|ip| ip as *mut INode);

    p.state = Procstate::RUNNABLE;

    p.lock.release();
}

// Grow or shrink user memory by n bytes.
pub fn growproc(n: i32) -> i32 {
    let p = myproc();
    let mut sz = p.sz;
    let pagetable = unsafe { &mut *p.pagetable.unwrap() };

    if n > 0 {
        let newsz = uvmalloc(pagetable, sz, sz + n as usize, PTE_W);
        if newsz == 0 {
            return -1;
        }
        sz = newsz;
    } else if n < 0 {
        sz = uvmdealloc(pagetable, sz, (sz as isize + n as isize) as usize);
    }
    p.sz = sz;
    0
}

// A fork child's very first scheduling by scheduler()
// will swtch to forkret.
fn forkret() {
    // Still holding p->lock from scheduler.
    myproc().lock.release();

    // File system initialization must be run in the context of a regular
    // process (e.g., because it calls sleep), and thus cannot be run from
    // kmain(). Only the very first process to reach here does it.
    static FIRST: AtomicBool = AtomicBool::new(true);
    if FIRST.swap(false, Ordering::SeqCst) {
        fs::fsinit(ROOTDEV);
    }

    usertrapret();
}

// Look in the process table for an UNUSED proc.
// If found, initialize state required to run in the kernel,
// and return with p->lock held.
// If there are no free procs, or a memory allocation fails, return None.
fn allocproc() -> Option<&'static mut Proc> {
    let mut found = None;
    for i in 0..NPROC {
        let p = unsafe { &mut PROCS[i] };
        p.lock.acquire();

        if p.state == Procstate::UNUSED {
            found = Some(p);
            break;
        }

        p.lock.release();
    }

    let p = found?;
    p.pid = allocpid();
    p.state = Procstate::USED;

    // Allocate a trapframe page.
    let trapframe_ptr: *mut Trapframe = unsafe { KMEM.kalloc() };
    if trapframe_ptr.is_null() {
        freeproc(p);
        p.lock.release();
        return None;
    }
    p.trapframe = Some(trapframe_ptr);
    p.signaling = Signaling::new();

    // An empty user page table, with the trampoline/trapframe/signal
    // mappings already in place.
    p.pagetable = proc_pagetable(p);
    if p.pagetable.is_none() {
        freeproc(p);
        p.lock.release();
        return None;
    }

    // Set up new context to start executing at forkret,
    // which returns to user space.
    p.context = Context::zero();
    p.context.ra = forkret as usize as u64;
    p.context.sp = (p.kstack + PGSIZE) as u64;

    Some(p)
}

// free a proc structure and the data hanging from it,
// including user pages.
// p->lock must be held.
fn freeproc(p: &mut Proc) {
    if let Some(tf) = p.trapframe {
        unsafe { KMEM.kfree(tf) };
    }
    p.trapframe = None;

    if let Some(stack) = p.signaling.stack {
        unsafe { KMEM.kfree(stack) };
    }

    if let Some(pagetable) = p.pagetable {
        proc_freepagetable(unsafe { &mut *pagetable }, p.sz);
    }
    p.pagetable = None;
    p.signaling = Signaling::new();

    p.sz = 0;
    p.pid = 0;
    p.parent = None;
    p.name = [0; MAXPROCNAME];
    p.chan = None;
    p.killed = 0;
    p.xstate = 0;
    p.alarm_set = false;
    p.cycles_at_alarm = 0;
    p.state = Procstate::UNUSED;
}

// Create a user page table for a given process, with no user memory, but
// with the trampoline, trapframe, and signal-handling pages mapped.
pub(crate) fn proc_pagetable(p: &mut Proc) -> Option<*mut PageTable> {
    let pagetable_ptr = uvmcreate()?;
    let pagetable = unsafe { &mut *pagetable_ptr };

    // map the trampoline code (for system call return) at the highest
    // user virtual address. only the supervisor uses it, on the way
    // to/from user space, so not PTE_U.
    let trampoline_addr = (unsafe { &trampoline } as *const u8).expose_provenance();
    if mappages(pagetable, TRAMPOLINE, trampoline_addr, PGSIZE, PTE_R | PTE_X) != 0 {
        uvmfree(pagetable, 0);
        return None;
    }

    // map the trapframe page just below the trampoline page.
    let trapframe_addr = p.trapframe.unwrap().expose_provenance();
    if mappages(pagetable, TRAPFRAME, trapframe_addr, PGSIZE, PTE_R | PTE_W) != 0 {
        uvmunmap(pagetable, TRAMPOLINE, 1, false);
        uvmfree(pagetable, 0);
        return None;
    }

    // map the signal-return stub just below the trapframe page, user
    // executable, so a handler's `ra` can point into it.
    let signalret_addr = (unsafe { &signalret } as *const u8).expose_provenance();
    if mappages(pagetable, SIGNALRET, signalret_addr, PGSIZE, PTE_R | PTE_X | PTE_U) != 0 {
        uvmunmap(pagetable, TRAMPOLINE, 1, false);
        uvmunmap(pagetable, TRAPFRAME, 1, false);
        uvmfree(pagetable, 0);
        return None;
    }

    // map a fresh, process-owned page as the stack a signal handler runs
    // on.
    let stack_page: *mut u8 = unsafe { KMEM.kalloc() };
    if stack_page.is_null() {
        uvmunmap(pagetable, TRAMPOLINE, 1, false);
        uvmunmap(pagetable, TRAPFRAME, 1, false);
        uvmunmap(pagetable, SIGNALRET, 1, false);
        uvmfree(pagetable, 0);
        return None;
    }
    memset(stack_page, 0, PGSIZE);
    if mappages(pagetable, SIGNALSTACK, stack_page.expose_provenance(), PGSIZE, PTE_R | PTE_W | PTE_U) != 0 {
        unsafe { KMEM.kfree(stack_page) };
        uvmunmap(pagetable, TRAMPOLINE, 1, false);
        uvmunmap(pagetable, TRAPFRAME, 1, false);
        uvmunmap(pagetable, SIGNALRET, 1, false);
        uvmfree(pagetable, 0);
        return None;
    }
    p.signaling.stack = Some(stack_page);

    Some(pagetable_ptr)
}

// Free a process's page table, and free the physical memory it refers to.
// The trapframe and signal stack pages are freed separately by freeproc,
// since they're not reachable from sz-bounded user memory.
pub(crate) fn proc_freepagetable(pagetable: &mut PageTable, sz: usize) {
    uvmunmap(pagetable, TRAMPOLINE, 1, false);
    uvmunmap(pagetable, TRAPFRAME, 1, false);
    uvmunmap(pagetable, SIGNALRET, 1, false);
    uvmunmap(pagetable, SIGNALSTACK, 1, false);
    uvmfree(pagetable, sz);
}

// Create a new process, copying the parent. Sets up child kernel stack to
// return as if from the fork() system call, with a0 = 0 in the child.
pub fn fork() -> Option<u32> {
    let p = myproc();

    let np = allocproc()?;

    if uvmcopy(
        unsafe { &mut *p.pagetable.unwrap() },
        unsafe { &mut *np.pagetable.unwrap() },
        p.sz,
    ) < 0
    {
        freeproc(np);
        np.lock.release();
        return None;
    }
    np.sz = p.sz;

    unsafe {
        let src = p.trapframe.unwrap();
        let dst = np.trapframe.unwrap();
        core::ptr::copy_nonoverlapping(src, dst, 1);
        (*dst).a0 = 0;
    }

    // increment reference counts on open file descriptors.
    for i in 0..NOFILE {
        if let Some(f) = p.ofile[i] {
            filedup(f);
            np.ofile[i] = Some(f);
        }
    }
    np.cwd = p.cwd.map(|ip| unsafe { (*ip).idup() as *mut INode });

    safestrcpy(&mut np.name, &p.name, MAXPROCNAME);

    let pid = np.pid;

    np.lock.release();

    unsafe { WAIT_LOCK.acquire(); }
    np.parent = Some(p as *mut Proc);
    unsafe { WAIT_LOCK.release(); }

    np.lock.acquire();
    np.state = Procstate::RUNNABLE;
    np.lock.release();

    Some(pid)
}

// Pass p's abandoned children to init.
// Caller must hold wait_lock.
fn reparent(p: &mut Proc) {
    let init = unsafe { INIT_PROC };
    for i in 0..NPROC {
        let pp = unsafe { &mut PROCS[i] };
        if pp.parent == Some(p as *mut Proc) {
            pp.parent = init;
            if let Some(ip) = init {
                wakeup(ip as *const Proc);
            }
        }
    }
}

fn close_files_and_cwd(p: &mut Proc) {
    for i in 0..NOFILE {
        if let Some(f) = p.ofile[i].take() {
            unsafe { crate::file::file::fileclose(&mut *f) };
        }
    }

    if let Some(cwd) = p.cwd.take() {
        unsafe { (*cwd).iput() };
    }
}

// Exit the current process. Does not return.
// An exited process remains in the zombie state
// until its parent calls wait().
pub fn exit(status: i32) -> ! {
    let p = myproc();

    if Some(p as *mut Proc) == unsafe { INIT_PROC } {
        panic!("init exiting");
    }

    close_files_and_cwd(p);

    unsafe { WAIT_LOCK.acquire(); }

    reparent(p);

    if let Some(parent) = p.parent {
        wakeup(parent as *const Proc);
    }

    p.lock.acquire();

    p.xstate = status as u8;
    p.state = Procstate::ZOMBIE;

    unsafe { WAIT_LOCK.release(); }

    sched();
    panic!("zombie exit");
}

// Reduced exit(), used from handle_signals: the process is already
// locked by the scheduler's per-process loop, and we can't call sched()
// since we're running on the dummy kstack, not p's own.
fn exit_from_signal(status: u8, p: &mut Proc) {
    if Some(p as *mut Proc) == unsafe { INIT_PROC } {
        panic!("init exiting");
    }

    close_files_and_cwd(p);

    unsafe { WAIT_LOCK.acquire(); }

    reparent(p);

    if let Some(parent) = p.parent {
        wakeup(parent as *const Proc);
    }

    p.xstate = status;
    p.state = Procstate::ZOMBIE;

    unsafe { WAIT_LOCK.release(); }
}

// Wait for a child process to exit and return its pid.
// Returns -1 if this process has no children.
pub fn wait(addr: usize) -> i32 {
    let p = myproc();

    unsafe { WAIT_LOCK.acquire(); }

    loop {
        let mut havekids = false;

        for i in 0..NPROC {
            let np = unsafe { &mut PROCS[i] };
            if np.parent != Some(p as *mut Proc) {
                continue;
            }

            np.lock.acquire();
            havekids = true;

            if np.state == Procstate::ZOMBIE {
                let pid = np.pid;
                if addr != 0 {
                    let pagetable = unsafe { &mut *p.pagetable.unwrap() };
                    let xstate = np.xstate;
                    if copyout(pagetable, addr, &xstate as *const u8, mem::size_of::<u8>()) < 0 {
                        np.lock.release();
                        unsafe { WAIT_LOCK.release(); }
                        return -1;
                    }
                }
                freeproc(np);
                np.lock.release();
                unsafe { WAIT_LOCK.release(); }
                return pid as i32;
            }

            np.lock.release();
        }

        if !havekids || killed(p) {
            unsafe { WAIT_LOCK.release(); }
            return -1;
        }

        sleep(p as *const Proc, unsafe { &mut WAIT_LOCK });
    }
}

// Per-CPU process scheduler.
// Each cpu calls scheduler() after setting itself up.
// Scheduler never returns. It loops, doing:
//  - choose a process to run.
//  - swtch to start running that process.
//  - eventually that process transfers control via swtch back
//    to the scheduler.
pub fn scheduler() -> ! {
    let c = mycpu();
    c.proc = None;

    let dummy_kstack: *mut u8 = unsafe { KMEM.kalloc() };
    if dummy_kstack.is_null() {
        panic!("scheduler: kalloc");
    }

    loop {
        // avoid deadlock by ensuring devices can interrupt.
        intr_on();

        let mut num_run = 0;

        for i in 0..NPROC {
            let p = unsafe { &mut PROCS[i] };
            p.lock.acquire();

            if p.state == Procstate::RUNNABLE {
                num_run += 1;
                p.state = Procstate::RUNNING;
                c.proc = Some(p as *mut Proc);

                if p.alarm_set && p.cycles_at_alarm <= ticks() {
                    p.alarm_set = false;
                    let _ = send_signal(
                        SignalValue { kind: SignalKind::Alarm, sender_pid: p.pid, payload: 0 },
                        p.pid,
                    );
                }

                if !handle_signals(dummy_kstack, p) {
                    unsafe { swtch(&mut c.context as *mut Context, &mut p.context as *mut Context); }
                }

                c.proc = None;
            }

            p.lock.release();
        }

        if num_run == 0 {
            unsafe { core::arch::asm!("wfi"); }
        }
    }
}

// Switch to scheduler. Must hold only p->lock and have changed
// proc->state. Saves and restores intena because intena is a property of
// this kernel thread, not this CPU.
fn sched() {
    let p = myproc();

    if !p.lock.holding() {
        panic!("sched p->lock");
    }
    if mycpu().noff != 1 {
        panic!("sched locks");
    }
    if p.state == Procstate::RUNNING {
        panic!("sched running");
    }
    if intr_get() {
        panic!("sched interruptible");
    }

    let intena = mycpu().intena;
    unsafe { swtch(&mut p.context as *mut Context, &mut mycpu().context as *mut Context); }
    mycpu().intena = intena;
}

// Give up the CPU for one scheduling round.
pub fn proc_yield() {
    let p = myproc();
    p.lock.acquire();
    p.state = Procstate::RUNNABLE;
    sched();
    p.lock.release();
}

// Atomically release lock and sleep on chan.
// Reacquires lock when awakened.
pub fn sleep<T>(chan: *const T, lk: &mut Spinlock) {
    let p = myproc();

    // Must acquire p->lock in order to change p->state and then call
    // sched. Once we hold p->lock, we can be guaranteed that we won't
    // miss any wakeup (wakeup locks p->lock), so it's okay to release lk.
    let same_lock = core::ptr::eq(lk as *const Spinlock, &p.lock as *const Spinlock);
    if !same_lock {
        p.lock.acquire();
        lk.release();
    }

    p.chan = Some(chan as *const u8 as usize);
    p.state = Procstate::SLEEPING;

    sched();

    p.chan = None;

    if !same_lock {
        p.lock.release();
        lk.acquire();
    }
}

// Wake up all processes sleeping on chan.
// Must be called without any p->lock.
pub fn wakeup<T>(chan: *const T) {
    let chan_addr = chan as *const u8 as usize;
    let me = current_proc_ptr();

    for i in 0..NPROC {
        let p = unsafe { &mut PROCS[i] };
        if Some(p as *mut Proc) == me {
            continue;
        }

        p.lock.acquire();
        if p.state == Procstate::SLEEPING && p.chan == Some(chan_addr) {
            p.state = Procstate::RUNNABLE;
        }
        p.lock.release();
    }
}

// Kill the process with the given pid.
// The victim won't exit until it tries to return to user space (see
// handle_signals and usertrap).
pub fn kill(pid: u32) -> i32 {
    for i in 0..NPROC {
        let p = unsafe { &mut PROCS[i] };
        p.lock.acquire();
        if p.pid == pid {
            p.killed = 1;
            if p.state == Procstate::SLEEPING {
                p.state = Procstate::RUNNABLE;
            }
            p.lock.release();
            return 0;
        }
        p.lock.release();
    }
    -1
}

pub fn setkilled(p: &mut Proc) {
    p.lock.acquire();
    p.killed = 1;
    p.lock.release();
}

pub fn killed(p: &mut Proc) -> bool {
    p.lock.acquire();
    let k = p.killed != 0;
    p.lock.release();
    k
}

// Copy to either a user address, or kernel address, depending on
// user_dst.
pub fn either_copyout(user_dst: bool, dst: *mut u8, src: *const u8, len: usize) -> i32 {
    let p = myproc();
    if user_dst {
        let pagetable = unsafe { &mut *p.pagetable.unwrap() };
        copyout(pagetable, dst.expose_provenance(), src, len)
    } else {
        memmove(dst, src, len);
        0
    }
}

// Copy from either a user address, or kernel address, depending on
// user_src.
pub fn either_copyin(dst: *mut u8, user_src: bool, src: *const u8, len: usize) -> i32 {
    let p = myproc();
    if user_src {
        let pagetable = unsafe { &mut *p.pagetable.unwrap() };
        copyin(pagetable, dst, src.expose_provenance(), len)
    } else {
        memmove(dst, src, len);
        0
    }
}

// Print a process listing to console, for debugging. Runs when a user
// types ^P on the console. No locking, to avoid wedging a stuck machine
// further.
pub fn procdump() {
    printf!("\n");
    for i in 0..NPROC {
        let p = unsafe { &PROCS[i] };
        if p.state == Procstate::UNUSED {
            continue;
        }
        let name = core::str::from_utf8(&p.name).unwrap_or("?");
        printf!("{} {:?} {}\n", p.pid, p.state, name.trim_end_matches('\0'));
    }
}

/// Reasons [`send_signal`] can fail to enqueue a signal.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum SendSignalError {
    /// No live process has `receiver_pid`.
    NotFound,
    /// The receiver's queue is at its effective capacity.
    QueueFull,
}

// Enqueue `value` on the process identified by `receiver_pid`. Sending to
// oneself skips acquiring the receiver's lock, since the caller already
// holds it implicitly by virtue of being that process.
pub fn send_signal(value: SignalValue, receiver_pid: u32) -> Result<(), SendSignalError> {
    let sender_pid = current_proc_ptr()
        .map(|p| unsafe { (*p).pid })
        .unwrap_or(0);

    for i in 0..NPROC {
        let p = unsafe { &mut PROCS[i] };
        if p.pid != receiver_pid {
            continue;
        }

        let self_send = sender_pid == receiver_pid;
        if !self_send {
            p.lock.acquire();
        }

        let result = p.signaling.queue.push(value).map_err(|_| SendSignalError::QueueFull);

        if !self_send {
            p.lock.release();
        }

        return result;
    }

    Err(SendSignalError::NotFound)
}

// Set the calling process's disposition for a catchable signal kind.
// Returns -1 if kind_index names an uncatchable or out-of-range kind.
pub fn set_signal_handler(kind_index: usize, disposition: Disposition) -> i32 {
    if kind_index >= SIGNAL_CATCHABLE_COUNT {
        return -1;
    }
    myproc().signaling.handlers[kind_index] = disposition;
    0
}

// Arm (or re-arm, or disarm) the calling process's alarm clock, seconds
// from now. Returns the number of seconds left on any previously-armed
// alarm, or 0 if none was armed.
pub fn alarm(seconds: u32) -> u32 {
    let p = myproc();
    p.lock.acquire();

    let remaining = if p.alarm_set {
        if seconds == 0 {
            p.alarm_set = false;
        }
        ((p.cycles_at_alarm.saturating_sub(ticks())) / TICK_RATE) as u32
    } else {
        p.alarm_set = seconds != 0;
        0
    };

    if seconds != 0 {
        p.cycles_at_alarm = ticks() + seconds as u64 * TICK_RATE;
    }

    p.lock.release();
    remaining
}

// Drain p's pending signal queue, dispatching each one per its
// disposition. Called by the scheduler instead of swtch()ing straight
// into p whenever the queue is non-empty. Returns true if p died (was
// killed, or became a zombie) while being signaled, in which case the
// scheduler must not swtch into it.
fn handle_signals(dummy_kstack: *mut u8, p: &mut Proc) -> bool {
    if p.signaling.queue.is_empty() {
        return false;
    }

    let saved_tf = unsafe { *p.trapframe.unwrap() };
    let saved_context = p.context;
    let old_kstack = p.kstack;

    p.kstack = dummy_kstack.expose_provenance();

    let mut died = false;

    while let Some(signal) = p.signaling.queue.pop() {
        if signal.kind.is_catchable() {
            let disposition = p.signaling.handlers[signal.kind.index()];
            match disposition {
                Disposition::Ignore => {}
                Disposition::Terminate => exit_from_signal(1, p),
                Disposition::User(handler_entry) => {
                    unsafe {
                        memmove(dummy_kstack, old_kstack as *const u8, PGSIZE);
                    }
                    p.context.sp = dummy_kstack.expose_provenance() as u64 + (p.context.sp - old_kstack as u64);

                    if let Some(stack) = p.signaling.stack {
                        memset(stack, 0, PGSIZE);
                    }

                    let tf = unsafe { &mut *p.trapframe.unwrap() };
                    let saved_gp = tf.gp;
                    *tf = Trapframe::zeroed();
                    tf.epc = handler_entry as u64;
                    tf.ra = SIGNALRET as u64;
                    tf.sp = (SIGNALSTACK + PGSIZE) as u64;
                    tf.gp = saved_gp;
                    tf.a0 = ((signal.sender_pid as u64) << 32) | signal.kind.index() as u64;
                    tf.a1 = signal.payload;

                    let c = mycpu();
                    unsafe { swtch(&mut c.context as *mut Context, &mut p.context as *mut Context); }

                    let result = match p.state {
                        Procstate::RUNNABLE => {
                            p.state = Procstate::RUNNING;
                            tf.a0
                        }
                        Procstate::SLEEPING => u64::MAX,
                        _ => 0,
                    };

                    p.context = saved_context;

                    if result != 0 && result != u64::MAX {
                        exit_from_signal(result as u8, p);
                    }
                }
            }
        } else {
            // uncatchable: unconditionally terminates the receiver.
            exit_from_signal(1, p);
        }

        died = p.killed != 0 || p.state == Procstate::ZOMBIE;
        if died {
            break;
        }
    }

    unsafe { *p.trapframe.unwrap() = saved_tf; }
    p.kstack = old_kstack;

    died
}
