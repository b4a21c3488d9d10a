use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Counters shared by an engine and its workers
#[derive(Debug, Clone)]
pub struct EngineMetrics {
    // Database updates
    updates: Arc<AtomicU64>,
    update_failures: Arc<AtomicU64>,

    // Dispatch
    scans: Arc<AtomicU64>,
    busy_rejections: Arc<AtomicU64>,
    scan_errors: Arc<AtomicU64>,

    // Worker refreshes and workspace memory
    refreshes: Arc<AtomicU64>,
    refresh_failures: Arc<AtomicU64>,
    workspace_bytes: Arc<AtomicU64>,
    peak_workspace_bytes: Arc<AtomicU64>,
}

impl EngineMetrics {
    /// Creates a new EngineMetrics instance with every counter at zero
    pub fn new() -> Self {
        Self {
            updates: Arc::new(AtomicU64::new(0)),
            update_failures: Arc::new(AtomicU64::new(0)),
            scans: Arc::new(AtomicU64::new(0)),
            busy_rejections: Arc::new(AtomicU64::new(0)),
            scan_errors: Arc::new(AtomicU64::new(0)),
            refreshes: Arc::new(AtomicU64::new(0)),
            refresh_failures: Arc::new(AtomicU64::new(0)),
            workspace_bytes: Arc::new(AtomicU64::new(0)),
            peak_workspace_bytes: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Records a database update
    pub fn record_update(&self, success: bool) {
        if success {
            self.updates.fetch_add(1, Ordering::Relaxed);
        } else {
            self.update_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Records a scan served by a worker
    pub fn record_scan(&self, success: bool) {
        self.scans.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.scan_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Records a request rejected because no worker was idle
    pub fn record_busy(&self) {
        self.busy_rejections.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a worker adopting a new database
    pub fn record_refresh(&self, success: bool) {
        self.refreshes.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.refresh_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Records a workspace growing or shrinking from `before` to `after` bytes
    pub fn record_workspace(&self, before: u64, after: u64) {
        if after >= before {
            self.record_allocation(after - before);
        } else {
            self.record_deallocation(before - after);
        }
    }

    /// Records workspace growth
    fn record_allocation(&self, bytes: u64) {
        let total = self.workspace_bytes.fetch_add(bytes, Ordering::Relaxed) + bytes;
        let mut peak = self.peak_workspace_bytes.load(Ordering::Relaxed);
        while total > peak {
            match self.peak_workspace_bytes.compare_exchange_weak(
                peak,
                total,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(current) => peak = current,
            }
        }
        debug!("Workspace allocated: {} bytes, total: {} bytes", bytes, total);
    }

    /// Records workspace release
    fn record_deallocation(&self, bytes: u64) {
        let total = self
            .workspace_bytes
            .fetch_sub(bytes, Ordering::Relaxed)
            .saturating_sub(bytes);
        debug!(
            "Workspace released: {} bytes, total: {} bytes",
            bytes, total
        );
    }

    /// Gets the current counter values
    pub fn snapshot(&self) -> EngineStats {
        EngineStats {
            updates: self.updates.load(Ordering::Relaxed),
            update_failures: self.update_failures.load(Ordering::Relaxed),
            scans: self.scans.load(Ordering::Relaxed),
            busy_rejections: self.busy_rejections.load(Ordering::Relaxed),
            scan_errors: self.scan_errors.load(Ordering::Relaxed),
            refreshes: self.refreshes.load(Ordering::Relaxed),
            refresh_failures: self.refresh_failures.load(Ordering::Relaxed),
            workspace_bytes: self.workspace_bytes.load(Ordering::Relaxed),
            peak_workspace_bytes: self.peak_workspace_bytes.load(Ordering::Relaxed),
        }
    }

    /// Logs the current counter values
    pub fn log_stats(&self) {
        let stats = self.snapshot();
        info!(
            "Engine stats:\n\
             Updates (ok/failed): {}/{}\n\
             Scans (total/failed): {}/{}\n\
             Busy rejections: {}\n\
             Worker refreshes (total/failed): {}/{}\n\
             Workspace bytes (current/peak): {}/{}",
            stats.updates,
            stats.update_failures,
            stats.scans,
            stats.scan_errors,
            stats.busy_rejections,
            stats.refreshes,
            stats.refresh_failures,
            stats.workspace_bytes,
            stats.peak_workspace_bytes
        );
    }
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`EngineMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub updates: u64,
    pub update_failures: u64,
    pub scans: u64,
    pub busy_rejections: u64,
    pub scan_errors: u64,
    pub refreshes: u64,
    pub refresh_failures: u64,
    pub workspace_bytes: u64,
    pub peak_workspace_bytes: u64,
}
