//! Physical memory probe for heap sizing

/// Source of physical-memory information. Heap-sizing arguments are
/// simply omitted when the probe cannot answer.
pub trait MemoryProbe: Send + Sync {
    /// Total physical memory in megabytes, if known.
    fn total_physical_mb(&self) -> Option<u64>;
}

/// Probe backed by `sysinfo`.
#[derive(Debug, Default)]
pub struct SysinfoProbe;

impl MemoryProbe for SysinfoProbe {
    fn total_physical_mb(&self) -> Option<u64> {
        let mut system = sysinfo::System::new();
        system.refresh_memory();
        let total = system.total_memory();
        if total == 0 {
            None
        } else {
            Some(total / 1024 / 1024)
        }
    }
}

/// Fixed-answer probe for tests.
#[derive(Debug)]
pub struct FixedProbe(pub Option<u64>);

impl MemoryProbe for FixedProbe {
    fn total_physical_mb(&self) -> Option<u64> {
        self.0
    }
}
