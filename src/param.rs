// Kernel-wide size limits. Grouped here, rather than scattered as magic
// numbers, the way the rest of the kernel expects to find them.

pub const NPROC: usize = 64; // maximum number of processes
pub const NCPU: usize = 8; // maximum number of CPUs
pub const NOFILE: usize = 16; // open files per process
pub const NFILE: usize = 100; // open files per system
pub const NDEV: usize = 10; // maximum major device number
pub const ROOTDEV: u32 = 1; // device number of file system root disk
pub const MAXARG: usize = 32; // max exec arguments
pub const MAXPATH: usize = 128; // max file path name
pub const MAXPROCNAME: usize = 16; // length of proc.name, including nul
pub const NBUF: usize = 30; // size of disk block cache
pub const NINODE: usize = 50; // maximum number of active i-nodes
pub const LOGSIZE: usize = 30; // max data blocks in on-disk log

/// Scheduler-tick rate: how many timer interrupts occur per second.
/// `alarm()`'s argument is in whole seconds; internally an alarm deadline is
/// tracked in ticks, `seconds * TICK_RATE` apart. Grounded in the existing
/// `start.rs` timer-interval comment ("about 1/10th second in qemu").
pub const TICK_RATE: u64 = 10;

/// Per-process signal ring-buffer capacity. `send_signal` enforces
/// `count + 1 < MAX_SIGNALS`, so the effective usable capacity is
/// `MAX_SIGNALS - 1`.
pub const MAX_SIGNALS: usize = 512;
