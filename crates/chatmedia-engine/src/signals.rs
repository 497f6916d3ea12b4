use chatmedia_contracts::pressure::MemoryPressureSample;
use sysinfo::System;
use tracing::debug;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Host memory hints fed into pressure samples. Either field may be missing
/// when the platform does not report it.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DeviceSignals {
    pub device_memory_gb: Option<f64>,
    pub heap_ratio: Option<f64>,
}

impl DeviceSignals {
    pub fn probe() -> Self {
        let mut sys = System::new();
        sys.refresh_memory();
        let signals = Self::from_memory(sys.total_memory(), sys.used_memory());
        debug!(
            device_memory_gb = ?signals.device_memory_gb,
            heap_ratio = ?signals.heap_ratio,
            "probed device memory"
        );
        signals
    }

    pub fn from_memory(total_bytes: u64, used_bytes: u64) -> Self {
        if total_bytes == 0 {
            return Self::default();
        }
        let total = total_bytes as f64;
        Self {
            device_memory_gb: Some(total / GIB),
            heap_ratio: Some((used_bytes as f64 / total).clamp(0.0, 1.0)),
        }
    }

    /// Fills the optional fields the caller left empty; explicit values win.
    pub fn apply(&self, sample: MemoryPressureSample) -> MemoryPressureSample {
        MemoryPressureSample {
            device_memory_gb: sample.device_memory_gb.or(self.device_memory_gb),
            heap_ratio: sample.heap_ratio.or(self.heap_ratio),
            ..sample
        }
    }
}
