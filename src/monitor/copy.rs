use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::{Duration, Instant};

use crate::monitor::{ExitStatus, PROGRESS_TICK_INTERVAL, ScanState, format_size};
use crate::types::TransferOperation;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyMonitorSnapshot {
    pub transfer_size: i64,
    pub skip_size: i64,
    /// Transferred plus skipped bytes.
    pub deal_size: i64,
    pub file_num: i64,
    pub dir_num: i64,
    pub skip_num: i64,
    pub skip_num_dir: i64,
    pub err_num: i64,
    pub ok_num: i64,
    pub deal_num: i64,
}

#[derive(Debug)]
struct Tick {
    at: Instant,
    transfer_size: i64,
}

#[derive(Debug)]
pub struct CopyMonitor {
    operation: TransferOperation,
    total_size: AtomicI64,
    total_num: AtomicI64,
    transfer_size: AtomicI64,
    skip_size: AtomicI64,
    deal_size: AtomicI64,
    file_num: AtomicI64,
    dir_num: AtomicI64,
    skip_num: AtomicI64,
    skip_num_dir: AtomicI64,
    err_num: AtomicI64,
    scan: ScanState,
    finished: AtomicBool,
    tick_interval: Duration,
    last_tick: Mutex<Tick>,
}

impl CopyMonitor {
    pub fn new(operation: TransferOperation) -> Self {
        Self::with_tick_interval(operation, PROGRESS_TICK_INTERVAL)
    }

    pub fn with_tick_interval(operation: TransferOperation, tick_interval: Duration) -> Self {
        Self {
            operation,
            total_size: AtomicI64::new(0),
            total_num: AtomicI64::new(0),
            transfer_size: AtomicI64::new(0),
            skip_size: AtomicI64::new(0),
            deal_size: AtomicI64::new(0),
            file_num: AtomicI64::new(0),
            dir_num: AtomicI64::new(0),
            skip_num: AtomicI64::new(0),
            skip_num_dir: AtomicI64::new(0),
            err_num: AtomicI64::new(0),
            scan: ScanState::default(),
            finished: AtomicBool::new(false),
            tick_interval,
            last_tick: Mutex::new(Tick {
                at: Instant::now(),
                transfer_size: 0,
            }),
        }
    }

    pub fn operation(&self) -> TransferOperation {
        self.operation
    }

    pub fn set_scan_error(&self) {
        self.scan.set_error();
    }

    pub fn set_scan_end(&self) {
        self.scan.set_end();
    }

    pub fn is_scan_complete(&self) -> bool {
        self.scan.is_complete()
    }

    pub fn update_scan(&self, size: i64, num: i64) {
        self.total_size.fetch_add(size, Ordering::SeqCst);
        self.total_num.fetch_add(num, Ordering::SeqCst);
    }

    pub fn total_num(&self) -> i64 {
        self.total_num.load(Ordering::SeqCst)
    }

    pub fn total_size(&self) -> i64 {
        self.total_size.load(Ordering::SeqCst)
    }

    pub fn update_file(&self, size: i64, num: i64) {
        self.file_num.fetch_add(num, Ordering::SeqCst);
        self.transfer_size.fetch_add(size, Ordering::SeqCst);
        self.deal_size.fetch_add(size, Ordering::SeqCst);
    }

    pub fn update_dir(&self, size: i64, num: i64) {
        self.dir_num.fetch_add(num, Ordering::SeqCst);
        self.transfer_size.fetch_add(size, Ordering::SeqCst);
        self.deal_size.fetch_add(size, Ordering::SeqCst);
    }

    pub fn update_skip(&self, size: i64, num: i64) {
        self.skip_num.fetch_add(num, Ordering::SeqCst);
        self.skip_size.fetch_add(size, Ordering::SeqCst);
    }

    pub fn update_skip_dir(&self, num: i64) {
        self.skip_num_dir.fetch_add(num, Ordering::SeqCst);
    }

    pub fn update_err(&self, size: i64, num: i64) {
        self.err_num.fetch_add(num, Ordering::SeqCst);
        self.transfer_size.fetch_add(size, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> CopyMonitorSnapshot {
        let skip_size = self.skip_size.load(Ordering::SeqCst);
        let file_num = self.file_num.load(Ordering::SeqCst);
        let dir_num = self.dir_num.load(Ordering::SeqCst);
        let skip_num = self.skip_num.load(Ordering::SeqCst);
        let err_num = self.err_num.load(Ordering::SeqCst);
        let ok_num = file_num + dir_num + skip_num;

        CopyMonitorSnapshot {
            transfer_size: self.transfer_size.load(Ordering::SeqCst),
            skip_size,
            deal_size: self.deal_size.load(Ordering::SeqCst) + skip_size,
            file_num,
            dir_num,
            skip_num,
            skip_num_dir: self.skip_num_dir.load(Ordering::SeqCst),
            err_num,
            ok_num,
            deal_num: ok_num + err_num,
        }
    }

    /// The running progress line, or `None` when the tick interval has not elapsed since
    /// the previous line or the finish line has been rendered.
    pub fn progress_line(&self) -> Option<String> {
        if self.finished.load(Ordering::SeqCst) {
            return None;
        }

        let snapshot = self.snapshot();
        let speed = {
            let mut last_tick = self.last_tick.lock().ok()?;
            let elapsed = last_tick.at.elapsed();
            if elapsed < self.tick_interval {
                return None;
            }
            let increment = snapshot.transfer_size - last_tick.transfer_size;
            last_tick.at = Instant::now();
            last_tick.transfer_size = snapshot.transfer_size;
            speed_kb_per_sec(increment, elapsed)
        };

        Some(self.render_progress(&snapshot, speed))
    }

    /// The summary line. Only the first call renders it.
    pub fn finish_line(&self, exit_status: ExitStatus) -> Option<String> {
        if self.finished.swap(true, Ordering::SeqCst) {
            return None;
        }

        let snapshot = self.snapshot();
        Some(match exit_status {
            ExitStatus::Normal => self.render_finish(&snapshot),
            ExitStatus::Error => self.render_defeat(&snapshot),
        })
    }

    pub fn percent(&self, snapshot: &CopyMonitorSnapshot) -> f64 {
        if !self.scan.is_complete() {
            return 0.0;
        }

        let total_size = self.total_size();
        if total_size != 0 {
            return (snapshot.deal_size * 100) as f64 / total_size as f64;
        }
        let total_num = self.total_num();
        if total_num != 0 {
            return (snapshot.deal_num * 100) as f64 / total_num as f64;
        }
        0.0
    }

    fn render_progress(&self, snapshot: &CopyMonitorSnapshot, speed: f64) -> String {
        if self.scan.is_complete() {
            return format!(
                "Total num: {}, size: {}. Dealed num: {}{}{}, Progress: {:.3}%, Speed: {:.2}KB/s",
                self.total_num(),
                format_size(self.total_size()),
                snapshot.deal_num,
                self.deal_num_detail(snapshot),
                deal_size_detail(snapshot),
                self.percent(snapshot),
                speed
            );
        }

        format!(
            "Scanned num: {}, size: {}. Dealed num: {}{}{}, Speed: {:.2}KB/s.",
            self.total_num().max(snapshot.deal_num),
            format_size(self.total_size().max(snapshot.deal_size)),
            snapshot.deal_num,
            self.deal_num_detail(snapshot),
            deal_size_detail(snapshot),
            speed
        )
    }

    fn render_finish(&self, snapshot: &CopyMonitorSnapshot) -> String {
        if self.scan.is_complete() {
            if snapshot.err_num == 0 {
                return format!(
                    "Succeed: Total num: {}, size: {}. OK num: {}{}{}.",
                    self.total_num(),
                    format_size(self.total_size()),
                    snapshot.ok_num,
                    self.deal_num_detail(snapshot),
                    skip_size_detail(snapshot)
                );
            }
            return format!(
                "FinishWithError: Total num: {}, size: {}. Error num: {}. OK num: {}{}{}.",
                self.total_num(),
                format_size(self.total_size()),
                snapshot.err_num,
                snapshot.ok_num,
                self.ok_num_detail(snapshot),
                size_detail(snapshot)
            );
        }

        let scan_num = self.total_num().max(snapshot.deal_num);
        if snapshot.err_num == 0 {
            return format!(
                "Succeed: Total num: {}, size: {}. OK num: {}{}{}.",
                scan_num,
                format_size(snapshot.deal_size),
                snapshot.ok_num,
                self.deal_num_detail(snapshot),
                skip_size_detail(snapshot)
            );
        }
        format!(
            "FinishWithError: Scanned {} {}. Error num: {}. OK num: {}{}{}.",
            scan_num,
            self.operation.subject(),
            snapshot.err_num,
            snapshot.ok_num,
            self.ok_num_detail(snapshot),
            size_detail(snapshot)
        )
    }

    fn render_defeat(&self, snapshot: &CopyMonitorSnapshot) -> String {
        if self.scan.is_complete() {
            return format!(
                "Total num: {}, size: {}. Dealed num: {}{}{}. When error happens.",
                self.total_num(),
                format_size(self.total_size()),
                snapshot.ok_num,
                self.ok_num_detail(snapshot),
                size_detail(snapshot)
            );
        }

        format!(
            "Scanned {} {}. Dealed num: {}{}{}. When error happens.",
            self.total_num().max(snapshot.deal_num),
            self.operation.subject(),
            snapshot.ok_num,
            self.ok_num_detail(snapshot),
            size_detail(snapshot)
        )
    }

    fn deal_num_detail(&self, snapshot: &CopyMonitorSnapshot) -> String {
        self.num_detail(snapshot, true)
    }

    fn ok_num_detail(&self, snapshot: &CopyMonitorSnapshot) -> String {
        self.num_detail(snapshot, false)
    }

    fn num_detail(&self, snapshot: &CopyMonitorSnapshot, with_error: bool) -> String {
        if !with_error && snapshot.ok_num == 0 {
            return String::new();
        }

        let op_str = self.operation.op_str();
        let subject = self.operation.subject();
        let mut details = vec![];
        if with_error && snapshot.err_num != 0 {
            details.push(format!("Error {} {subject}", snapshot.err_num));
        }
        if snapshot.file_num != 0 {
            details.push(format!("{op_str} {} {subject}", snapshot.file_num));
        }
        if snapshot.dir_num != 0 {
            if snapshot.file_num == 0 {
                details.push(format!("{op_str} {} directories", snapshot.dir_num));
            } else {
                details.push(format!("{} directories", snapshot.dir_num));
            }
        }
        if snapshot.skip_num != 0 {
            details.push(format!("skip {} {subject}", snapshot.skip_num));
        }
        if snapshot.skip_num_dir != 0 {
            details.push(format!("skip {} directory", snapshot.skip_num_dir));
        }

        if details.is_empty() {
            return String::new();
        }
        format!("({})", details.join(", "))
    }
}

fn deal_size_detail(snapshot: &CopyMonitorSnapshot) -> String {
    format!(", OK size: {}", format_size(snapshot.deal_size))
}

fn skip_size_detail(snapshot: &CopyMonitorSnapshot) -> String {
    if snapshot.skip_size != 0 {
        return format!(", Skip size: {}", format_size(snapshot.skip_size));
    }
    String::new()
}

fn size_detail(snapshot: &CopyMonitorSnapshot) -> String {
    if snapshot.skip_size == 0 {
        return format!(", Transfer size: {}", format_size(snapshot.transfer_size));
    }
    if snapshot.transfer_size == 0 {
        return format!(", Skip size: {}", format_size(snapshot.skip_size));
    }
    format!(
        ", OK size: {}(transfer: {}, skip: {})",
        format_size(snapshot.transfer_size + snapshot.skip_size),
        format_size(snapshot.transfer_size),
        format_size(snapshot.skip_size)
    )
}

fn speed_kb_per_sec(increment: i64, elapsed: Duration) -> f64 {
    let seconds = elapsed.as_secs_f64();
    if seconds == 0.0 {
        return 0.0;
    }
    (increment as f64 / 1024.0) / seconds
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn monitor(operation: TransferOperation) -> CopyMonitor {
        CopyMonitor::with_tick_interval(operation, Duration::ZERO)
    }

    #[test]
    fn snapshot_counts() {
        let monitor = monitor(TransferOperation::Upload);
        monitor.update_file(100, 2);
        monitor.update_dir(0, 1);
        monitor.update_skip(50, 1);
        monitor.update_skip_dir(1);
        monitor.update_err(0, 1);

        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.transfer_size, 100);
        assert_eq!(snapshot.deal_size, 150);
        assert_eq!(snapshot.ok_num, 4);
        assert_eq!(snapshot.deal_num, 5);
        assert_eq!(snapshot.deal_num, snapshot.ok_num + snapshot.err_num);
    }

    #[test]
    fn concurrent_updates_are_conserved() {
        let monitor = Arc::new(monitor(TransferOperation::Download));

        let handles: Vec<_> = (0..8)
            .map(|index| {
                let monitor = monitor.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        if index % 2 == 0 {
                            monitor.update_file(3, 1);
                        } else {
                            monitor.update_err(0, 1);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.file_num, 4000);
        assert_eq!(snapshot.err_num, 4000);
        assert_eq!(snapshot.deal_num, 8000);
        assert_eq!(snapshot.transfer_size, 12000);
    }

    #[test]
    fn progress_while_scanning() {
        let monitor = monitor(TransferOperation::Upload);
        monitor.update_scan(1000, 3);
        monitor.update_file(1234, 4);

        let line = monitor.progress_line().unwrap();
        assert!(
            line.starts_with(
                "Scanned num: 4, size: 1,234. Dealed num: 4(upload 4 files), OK size: 1,234, Speed: "
            ),
            "{line}"
        );
        assert!(line.ends_with("KB/s."));
    }

    #[test]
    fn progress_after_scan() {
        let monitor = monitor(TransferOperation::Download);
        monitor.update_scan(2000, 4);
        monitor.set_scan_end();
        monitor.update_file(1000, 1);
        monitor.update_err(0, 1);

        let line = monitor.progress_line().unwrap();
        assert!(
            line.starts_with(
                "Total num: 4, size: 2,000. Dealed num: 2(Error 1 objects, download 1 objects), OK size: 1,000, Progress: 50.000%, Speed: "
            ),
            "{line}"
        );
    }

    #[test]
    fn progress_is_rate_limited() {
        let monitor = CopyMonitor::with_tick_interval(TransferOperation::Upload, Duration::from_secs(3600));
        assert!(monitor.progress_line().is_none());
    }

    #[test]
    fn finish_succeed() {
        let monitor = monitor(TransferOperation::Upload);
        monitor.update_scan(1500, 5);
        monitor.set_scan_end();
        monitor.update_file(1000, 3);
        monitor.update_dir(0, 1);
        monitor.update_skip(500, 1);

        assert_eq!(
            monitor.finish_line(ExitStatus::Normal).unwrap(),
            "Succeed: Total num: 5, size: 1,500. OK num: 5(upload 3 files, 1 directories, skip 1 files), Skip size: 500."
        );
        assert!(monitor.finish_line(ExitStatus::Normal).is_none());
        assert!(monitor.progress_line().is_none());
    }

    #[test]
    fn finish_directories_only() {
        let monitor = monitor(TransferOperation::Upload);
        monitor.set_scan_end();
        monitor.update_dir(0, 2);
        monitor.update_skip_dir(1);

        assert_eq!(
            monitor.finish_line(ExitStatus::Normal).unwrap(),
            "Succeed: Total num: 0, size: 0. OK num: 2(upload 2 directories, skip 1 directory)."
        );
    }

    #[test]
    fn finish_with_error() {
        let monitor = monitor(TransferOperation::Copy);
        monitor.update_scan(300, 3);
        monitor.set_scan_end();
        monitor.update_file(100, 1);
        monitor.update_skip(100, 1);
        monitor.update_err(0, 1);

        assert_eq!(
            monitor.finish_line(ExitStatus::Normal).unwrap(),
            "FinishWithError: Total num: 3, size: 300. Error num: 1. OK num: 2(copy 1 objects, skip 1 objects), OK size: 200(transfer: 100, skip: 100)."
        );
    }

    #[test]
    fn finish_with_error_while_scanning() {
        let monitor = monitor(TransferOperation::Download);
        monitor.update_err(0, 2);

        assert_eq!(
            monitor.finish_line(ExitStatus::Normal).unwrap(),
            "FinishWithError: Scanned 2 objects. Error num: 2. OK num: 0, Transfer size: 0."
        );
    }

    #[test]
    fn finish_defeat() {
        let monitor = monitor(TransferOperation::Upload);
        monitor.update_scan(100, 2);
        monitor.set_scan_error();
        monitor.update_skip(100, 1);

        assert_eq!(
            monitor.finish_line(ExitStatus::Error).unwrap(),
            "Scanned 2 files. Dealed num: 1(skip 1 files), Skip size: 100. When error happens."
        );
    }

    #[test]
    fn finish_defeat_after_scan() {
        let monitor = monitor(TransferOperation::Upload);
        monitor.update_scan(100, 2);
        monitor.set_scan_end();
        monitor.update_file(50, 1);

        assert_eq!(
            monitor.finish_line(ExitStatus::Error).unwrap(),
            "Total num: 2, size: 100. Dealed num: 1(upload 1 files), Transfer size: 50. When error happens."
        );
    }

    #[test]
    fn percent() {
        let monitor = monitor(TransferOperation::Upload);
        assert_eq!(monitor.percent(&monitor.snapshot()), 0.0);

        monitor.set_scan_end();
        assert_eq!(monitor.percent(&monitor.snapshot()), 0.0);

        monitor.update_scan(0, 4);
        monitor.update_file(0, 1);
        assert_eq!(monitor.percent(&monitor.snapshot()), 25.0);

        monitor.update_scan(400, 0);
        monitor.update_file(100, 1);
        assert_eq!(monitor.percent(&monitor.snapshot()), 25.0);
    }
}
