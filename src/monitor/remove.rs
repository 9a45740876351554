use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};

use crate::monitor::{ExitStatus, ScanState};
use crate::types::OperationKind;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoveMonitorSnapshot {
    pub object_num: i64,
    pub upload_id_num: i64,
    pub err_object_num: i64,
    pub err_upload_id_num: i64,
    pub ok_num: i64,
    pub err_num: i64,
    pub deal_num: i64,
    pub removed_bucket: String,
}

#[derive(Debug, Default)]
pub struct RemoveMonitor {
    op: AtomicU32,
    total_object_num: AtomicI64,
    total_upload_id_num: AtomicI64,
    object_num: AtomicI64,
    upload_id_num: AtomicI64,
    err_object_num: AtomicI64,
    err_upload_id_num: AtomicI64,
    removed_bucket: Mutex<String>,
    scan: ScanState,
    finished: AtomicBool,
}

impl RemoveMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn op(&self) -> OperationKind {
        OperationKind::from_bits_truncate(self.op.load(Ordering::SeqCst))
    }

    pub fn update_op(&self, op: OperationKind) {
        self.op.fetch_or(op.bits(), Ordering::SeqCst);
    }

    pub fn set_op(&self, op: OperationKind) {
        self.op.store(op.bits(), Ordering::SeqCst);
    }

    pub fn set_scan_error(&self) {
        self.scan.set_error();
    }

    pub fn set_scan_end(&self) {
        self.scan.set_end();
    }

    pub fn update_scan_object_num(&self, num: i64) {
        self.total_object_num.fetch_add(num, Ordering::SeqCst);
    }

    pub fn update_scan_upload_id_num(&self, num: i64) {
        self.total_upload_id_num.fetch_add(num, Ordering::SeqCst);
    }

    pub fn update_object_num(&self, num: i64) {
        self.object_num.fetch_add(num, Ordering::SeqCst);
    }

    pub fn update_upload_id_num(&self, num: i64) {
        self.upload_id_num.fetch_add(num, Ordering::SeqCst);
    }

    pub fn update_err_object_num(&self, num: i64) {
        self.err_object_num.fetch_add(num, Ordering::SeqCst);
    }

    pub fn update_err_upload_id_num(&self, num: i64) {
        self.err_upload_id_num.fetch_add(num, Ordering::SeqCst);
    }

    pub fn update_removed_bucket(&self, bucket: &str) {
        if let Ok(mut removed_bucket) = self.removed_bucket.lock() {
            *removed_bucket = bucket.to_string();
        }
    }

    pub fn snapshot(&self) -> RemoveMonitorSnapshot {
        let object_num = self.object_num.load(Ordering::SeqCst);
        let upload_id_num = self.upload_id_num.load(Ordering::SeqCst);
        let err_object_num = self.err_object_num.load(Ordering::SeqCst);
        let err_upload_id_num = self.err_upload_id_num.load(Ordering::SeqCst);
        let ok_num = object_num + upload_id_num;
        let err_num = err_object_num + err_upload_id_num;

        RemoveMonitorSnapshot {
            object_num,
            upload_id_num,
            err_object_num,
            err_upload_id_num,
            ok_num,
            err_num,
            deal_num: ok_num + err_num,
            removed_bucket: self
                .removed_bucket
                .lock()
                .map(|bucket| bucket.clone())
                .unwrap_or_default(),
        }
    }

    /// The running progress line. Empty while the batch touches no objects or uploads.
    pub fn progress_line(&self) -> String {
        if self.finished.load(Ordering::SeqCst) || !self.op().intersects(OperationKind::ALL) {
            return String::new();
        }

        let snapshot = self.snapshot();
        let (total_object_num, total_upload_id_num) = self.totals(&snapshot);
        let total_info = self.total_info(total_object_num, total_upload_id_num);
        if self.scan.is_complete() {
            return format!(
                "Total {total_info}. {}{} Progress: {}%",
                self.ok_info(&snapshot),
                err_info(&snapshot),
                self.percent(&snapshot)
            );
        }

        format!(
            "Scanned {total_info}. {}{}",
            self.ok_info(&snapshot),
            err_info(&snapshot)
        )
    }

    /// The summary line. Only the first call renders it.
    pub fn finish_line(&self, exit_status: ExitStatus) -> Option<String> {
        if self.finished.swap(true, Ordering::SeqCst) {
            return None;
        }

        let snapshot = self.snapshot();
        let mut lines = vec![];
        if self.op().intersects(OperationKind::ALL) {
            let (total_object_num, total_upload_id_num) = self.totals(&snapshot);
            let total_info = self.total_info(total_object_num, total_upload_id_num);
            let ok_info = self.ok_info(&snapshot);
            let line = match (self.exit_status(&snapshot, exit_status), self.scan.is_complete()) {
                (ExitStatus::Error, true) => {
                    format!("Total {total_info}. {ok_info} when error happens.")
                }
                (ExitStatus::Error, false) => {
                    format!("Scanned {total_info}. {ok_info} when error happens.")
                }
                (ExitStatus::Normal, _) => format!("Succeed: Total {total_info}. {ok_info}"),
            };
            lines.push(line);
        }
        if self.op().contains(OperationKind::BUCKET) && !snapshot.removed_bucket.is_empty() {
            lines.push(format!("Removed Bucket: {}", snapshot.removed_bucket));
        }

        Some(lines.join("\n"))
    }

    pub fn exit_status(&self, snapshot: &RemoveMonitorSnapshot, exit_status: ExitStatus) -> ExitStatus {
        if exit_status != ExitStatus::Normal
            || snapshot.err_num != 0
            || (self.op().contains(OperationKind::BUCKET) && snapshot.removed_bucket.is_empty())
        {
            return ExitStatus::Error;
        }
        ExitStatus::Normal
    }

    pub fn percent(&self, snapshot: &RemoveMonitorSnapshot) -> i64 {
        if !self.scan.is_complete() {
            return 0;
        }

        let total = self.total_object_num.load(Ordering::SeqCst)
            + self.total_upload_id_num.load(Ordering::SeqCst);
        if total != 0 {
            return snapshot.deal_num * 100 / total;
        }
        0
    }

    // While scanning, the processed counts are a lower bound of the totals.
    fn totals(&self, snapshot: &RemoveMonitorSnapshot) -> (i64, i64) {
        let total_object_num = self.total_object_num.load(Ordering::SeqCst);
        let total_upload_id_num = self.total_upload_id_num.load(Ordering::SeqCst);
        if self.scan.is_complete() {
            return (total_object_num, total_upload_id_num);
        }

        (
            total_object_num.max(snapshot.object_num + snapshot.err_object_num),
            total_upload_id_num.max(snapshot.upload_id_num + snapshot.err_upload_id_num),
        )
    }

    fn total_info(&self, total_object_num: i64, total_upload_id_num: i64) -> String {
        let op = self.op();
        let mut infos = vec![];
        if op.contains(OperationKind::OBJECT) {
            infos.push(format!("{total_object_num} objects"));
        }
        if op.contains(OperationKind::MULTIPART_UPLOAD) {
            infos.push(format!("{total_upload_id_num} uploadIds"));
        }
        infos.join(", ")
    }

    fn ok_info(&self, snapshot: &RemoveMonitorSnapshot) -> String {
        let op = self.op();
        if !op.intersects(OperationKind::ALL) {
            return String::new();
        }

        let mut infos = vec![];
        if op.contains(OperationKind::OBJECT) {
            infos.push(format!("{} objects", snapshot.object_num));
        }
        if op.contains(OperationKind::MULTIPART_UPLOAD) {
            infos.push(format!("{} uploadIds", snapshot.upload_id_num));
        }
        format!("Removed {}.", infos.join(", "))
    }
}

fn err_info(snapshot: &RemoveMonitorSnapshot) -> String {
    if snapshot.err_num == 0 {
        return String::new();
    }

    let mut infos = vec![];
    if snapshot.err_object_num != 0 {
        infos.push(format!("{} objects", snapshot.err_object_num));
    }
    if snapshot.err_upload_id_num != 0 {
        infos.push(format!("{} uploadIds", snapshot.err_upload_id_num));
    }
    format!(" Error {}.", infos.join(", "))
}
