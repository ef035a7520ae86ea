use rlimit::{setrlimit, Resource};

const MEMORY_LIMIT: u64 = 512 * 1024 * 1024; // 512MB
const CPU_LIMIT: u64 = 60; // seconds
const FILE_SIZE_LIMIT: u64 = 100 * 1024 * 1024; // 100MB
const NPROC_LIMIT: u64 = 16;
const NOFILE_LIMIT: u64 = 128;

/// Kernel resource ceilings applied to subprocess handlers. Called from
/// `pre_exec`, so it must only touch async-signal-safe syscalls.
pub struct ResourceLimits;

impl ResourceLimits {
    pub fn apply() -> std::io::Result<()> {
        setrlimit(Resource::AS, MEMORY_LIMIT, MEMORY_LIMIT)?;
        setrlimit(Resource::CPU, CPU_LIMIT, CPU_LIMIT)?;
        setrlimit(Resource::FSIZE, FILE_SIZE_LIMIT, FILE_SIZE_LIMIT)?;
        setrlimit(Resource::NPROC, NPROC_LIMIT, NPROC_LIMIT)?;
        setrlimit(Resource::NOFILE, NOFILE_LIMIT, NOFILE_LIMIT)?;
        Ok(())
    }
}
