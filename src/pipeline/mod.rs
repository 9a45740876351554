use std::collections::VecDeque;
use std::path::MAIN_SEPARATOR;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Error, Result};
use async_channel::{Receiver, Sender};
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};

use crate::config::{CommandConfig, CopyConfig, RemoveConfig};
use crate::monitor::{CopyMonitor, Monitor, RemoveMonitor};
use crate::pipeline::filter::{ObjectFilter, RuleFilter};
use crate::pipeline::lister::{RemovalLister, TransferSourceLister};
use crate::pipeline::remover::ObjectRemover;
use crate::pipeline::report::ReportSink;
use crate::pipeline::stage::Stage;
use crate::pipeline::statistic::{CopyStatistic, RemoveStatistic};
use crate::pipeline::terminator::Terminator;
use crate::pipeline::transfer::{ObjectTransferrer, TransferContext};
use crate::storage::fs_bucket::FsBucketStorage;
use crate::storage::{Storage, with_force_retry};
use crate::store::snapshot::SnapshotStore;
use crate::types::filter_rule::FilterRules;
use crate::types::{OperationKind, PipelineCancellationToken, RemovalItem, TransferItem};
use crate::Config;

pub(crate) const CHANNEL_CAPACITY: usize = 1000;

mod filter;
pub mod lister;
mod remover;
mod report;
mod stage;
mod statistic;
mod terminator;
pub mod transfer;

/// One `cp` or `rm` batch.
pub struct Pipeline {
    config: Config,
    storage: Storage,
    monitor: Monitor,
    report: Option<Arc<ReportSink>>,
    cancellation_token: PipelineCancellationToken,
    has_error: Arc<AtomicBool>,
    has_warning: Arc<AtomicBool>,
    errors: Arc<Mutex<VecDeque<Error>>>,
    ready: bool,
}

impl Pipeline {
    /// A pipeline working on the buckets below `config.storage_root`.
    pub fn new(config: Config, cancellation_token: PipelineCancellationToken) -> Self {
        let storage = FsBucketStorage::boxed(&config.storage_root);
        Self::new_with_storage(config, storage, cancellation_token)
    }

    pub fn new_with_storage(
        config: Config,
        storage: Storage,
        cancellation_token: PipelineCancellationToken,
    ) -> Self {
        let (monitor, report) = match &config.command {
            CommandConfig::Copy(copy_config) => (
                Monitor::Copy(Arc::new(CopyMonitor::new(copy_config.operation))),
                Some(Arc::new(ReportSink::new(
                    &copy_config.output_dir,
                    &format!(
                        "{} {} to {}",
                        copy_config.operation.op_str(),
                        copy_config.source,
                        copy_config.target
                    ),
                ))),
            ),
            CommandConfig::Remove(_) => (Monitor::Remove(Arc::new(RemoveMonitor::new())), None),
        };

        Self {
            config,
            storage,
            monitor,
            report,
            cancellation_token,
            has_error: Arc::new(AtomicBool::new(false)),
            has_warning: Arc::new(AtomicBool::new(false)),
            errors: Arc::new(Mutex::new(VecDeque::<Error>::new())),
            ready: true,
        }
    }

    pub async fn run(&mut self) {
        if !self.ready {
            panic!("it can be executed only once.")
        }
        self.ready = false;

        match self.config.command.clone() {
            CommandConfig::Copy(config) => self.copy(config).await,
            CommandConfig::Remove(config) => self.remove(config).await,
        }
    }

    async fn copy(&self, config: CopyConfig) {
        let Monitor::Copy(monitor) = self.monitor.clone() else {
            return;
        };
        let Some(report) = self.report.clone() else {
            return;
        };

        let snapshot_store = match &config.snapshot_path {
            Some(path) => match SnapshotStore::open(path).await {
                Ok(snapshot_store) => Some(Arc::new(snapshot_store)),
                Err(e) => {
                    self.store_error(e, "failed to open snapshot store.");
                    return;
                }
            },
            None => None,
        };
        let download_root = match prepare_download_root(&config).await {
            Ok(download_root) => download_root,
            Err(e) => {
                self.store_error(e, "failed to prepare download destination.");
                return;
            }
        };

        let context = Arc::new(TransferContext::new(
            config.clone(),
            monitor.clone(),
            snapshot_store,
            report.clone(),
            self.config.confirm_callback.clone(),
            download_root,
        ));

        let statistic = CopyStatistic::new(
            self.clone_storage(),
            config.clone(),
            self.config.max_keys,
            monitor,
            self.cancellation_token.clone(),
        );
        let statistic_handle = tokio::spawn(async move { statistic.collect().await });

        let worker_size = config.worker_size;
        let rules = config.filter_config.rules.clone();
        let transferred = self.transfer_items(
            self.filter_items(self.list_transfer_source(config), rules),
            context.clone(),
            worker_size,
        );
        self.wait_terminator(self.terminate(transferred)).await;

        self.finish_statistic(statistic_handle).await;
        report.close().await;
        context.checkpoint_store.remove_dir_if_empty().await;
    }

    async fn remove(&self, config: RemoveConfig) {
        let Monitor::Remove(monitor) = self.monitor.clone() else {
            return;
        };

        let kind = config.operation_kind();
        monitor.update_op(kind & OperationKind::ALL);

        if kind.intersects(OperationKind::ALL) {
            let statistic = RemoveStatistic::new(
                self.clone_storage(),
                config.clone(),
                self.config.max_keys,
                monitor.clone(),
                self.cancellation_token.clone(),
            );
            let statistic_handle = tokio::spawn(async move { statistic.collect().await });

            let rules = config.filter_config.rules.clone();
            let config = Arc::new(config.clone());
            let removed = self.remove_items(
                self.filter_items(self.list_removal_target(config.as_ref().clone()), rules),
                config,
                monitor.clone(),
            );
            self.wait_terminator(self.terminate(removed)).await;

            self.finish_statistic(statistic_handle).await;
        }

        if kind.contains(OperationKind::BUCKET)
            && !self.has_error()
            && !self.cancellation_token.is_cancelled()
        {
            self.remove_bucket(&config, &monitor).await;
        }
    }

    async fn remove_bucket(&self, config: &RemoveConfig, monitor: &RemoveMonitor) {
        monitor.update_op(OperationKind::BUCKET);

        let storage = &self.storage;
        let bucket = config.target.bucket.as_str();
        let result = with_force_retry(&config.force_retry_config, "delete_bucket", bucket, || {
            storage.delete_bucket(bucket)
        })
        .await;

        match result {
            Ok(()) => {
                monitor.update_removed_bucket(bucket);
                debug!(bucket = bucket, "bucket removed.");
            }
            Err(e) => self.store_error(
                e.context(format!("delete_bucket() failed. bucket: {bucket}")),
                "remove bucket failed.",
            ),
        }
    }

    fn list_transfer_source(&self, config: CopyConfig) -> Receiver<TransferItem> {
        let (stage, next_stage_receiver) = self.create_spsc_stage(None, self.has_warning.clone());
        let lister = TransferSourceLister::new(stage, config, self.config.max_keys);
        let has_error = self.has_error.clone();
        let error_list = self.errors.clone();

        tokio::spawn(async move {
            let result = lister.list_source().await;
            match result {
                Ok(()) => {}
                Err(e) => {
                    log_error(has_error, error_list, e, "list source failed.");
                }
            }
        });

        next_stage_receiver
    }

    fn list_removal_target(&self, config: RemoveConfig) -> Receiver<RemovalItem> {
        let (stage, next_stage_receiver) = self.create_spsc_stage(None, self.has_warning.clone());
        let lister = RemovalLister::new(stage, config, self.config.max_keys);
        let has_error = self.has_error.clone();
        let error_list = self.errors.clone();

        tokio::spawn(async move {
            let result = lister.list_target().await;
            match result {
                Ok(()) => {}
                Err(e) => {
                    log_error(has_error, error_list, e, "list target failed.");
                }
            }
        });

        next_stage_receiver
    }

    fn filter_items<T>(&self, items: Receiver<T>, rules: FilterRules) -> Receiver<T>
    where
        RuleFilter<'static, T>: ObjectFilter + Send + Sync + 'static,
    {
        if rules.is_empty() {
            return items;
        }

        let (stage, next_stage_receiver) =
            self.create_spsc_stage(Some(items), self.has_warning.clone());
        self.spawn_filter(Box::new(RuleFilter::new(stage, rules)));
        trace!("RuleFilter has been started.");

        next_stage_receiver
    }

    fn spawn_filter(&self, filter: Box<dyn ObjectFilter + Send + Sync>) {
        let has_error = self.has_error.clone();
        let error_list = self.errors.clone();

        tokio::spawn(async move {
            let result = filter.filter().await;
            match result {
                Ok(_) => {}
                Err(e) => {
                    log_error(has_error, error_list, e, "filter failed.");
                }
            }
        });
    }

    fn transfer_items(
        &self,
        items: Receiver<TransferItem>,
        context: Arc<TransferContext>,
        worker_size: u16,
    ) -> Receiver<TransferItem> {
        let (sender, next_stage_receiver) =
            async_channel::bounded::<TransferItem>(CHANNEL_CAPACITY);

        for worker_index in 0..worker_size {
            let stage =
                self.create_mpmc_stage(sender.clone(), items.clone(), self.has_warning.clone());
            let transferrer = ObjectTransferrer::new(stage, worker_index, context.clone());
            let has_error = self.has_error.clone();
            let error_list = self.errors.clone();

            tokio::spawn(async move {
                let result = transferrer.transfer().await;
                match result {
                    Ok(_) => {}
                    Err(e) => {
                        log_error(has_error, error_list, e, "transfer failed.");
                    }
                }
            });
        }

        next_stage_receiver
    }

    fn remove_items(
        &self,
        items: Receiver<RemovalItem>,
        config: Arc<RemoveConfig>,
        monitor: Arc<RemoveMonitor>,
    ) -> Receiver<RemovalItem> {
        let (sender, next_stage_receiver) =
            async_channel::bounded::<RemovalItem>(CHANNEL_CAPACITY);

        for worker_index in 0..config.worker_size {
            let stage =
                self.create_mpmc_stage(sender.clone(), items.clone(), self.has_warning.clone());
            let remover =
                ObjectRemover::new(stage, worker_index, config.clone(), monitor.clone());
            let has_error = self.has_error.clone();
            let error_list = self.errors.clone();

            tokio::spawn(async move {
                let result = remover.remove_target().await;
                match result {
                    Ok(_) => {}
                    Err(e) => {
                        log_error(has_error, error_list, e, "remove failed.");
                    }
                }
            });
        }

        next_stage_receiver
    }

    fn terminate<T: Send + 'static>(&self, items: Receiver<T>) -> JoinHandle<u64> {
        let terminator = Terminator::new(items);

        tokio::spawn(async move { terminator.terminate().await })
    }

    async fn wait_terminator(&self, handle: JoinHandle<u64>) {
        if let Err(e) = handle.await {
            self.store_error(Error::from(e), "terminator failed.");
        }
    }

    // A cancelled batch does not wait for the totals.
    async fn finish_statistic(&self, handle: JoinHandle<()>) {
        if self.cancellation_token.is_cancelled() || self.has_error() {
            handle.abort();
        }
        if let Err(e) = handle.await {
            if !e.is_cancelled() {
                let error = e.to_string();
                warn!(error = error, "statistic task failed.");
            }
        }
    }

    fn create_spsc_stage<T>(
        &self,
        previous_stage_receiver: Option<Receiver<T>>,
        has_warning: Arc<AtomicBool>,
    ) -> (Stage<T>, Receiver<T>) {
        let (sender, next_stage_receiver) = async_channel::bounded::<T>(CHANNEL_CAPACITY);
        let stage = Stage::new(
            Some(self.clone_storage()),
            previous_stage_receiver,
            Some(sender),
            self.cancellation_token.clone(),
            has_warning,
        );

        (stage, next_stage_receiver)
    }

    fn create_mpmc_stage<T>(
        &self,
        sender: Sender<T>,
        receiver: Receiver<T>,
        has_warning: Arc<AtomicBool>,
    ) -> Stage<T> {
        Stage::new(
            Some(self.clone_storage()),
            Some(receiver),
            Some(sender),
            self.cancellation_token.clone(),
            has_warning,
        )
    }

    fn clone_storage(&self) -> Storage {
        dyn_clone::clone_box(&*self.storage)
    }

    fn store_error(&self, e: Error, message: &str) {
        log_error(self.has_error.clone(), self.errors.clone(), e, message);
    }

    pub fn monitor(&self) -> Monitor {
        self.monitor.clone()
    }

    /// Points at the report file of a copy batch in which items failed.
    pub async fn report_prompt(&self) -> Option<String> {
        match &self.report {
            Some(report) => report.prompt().await,
            None => None,
        }
    }

    pub fn has_error(&self) -> bool {
        self.has_error.load(Ordering::SeqCst)
    }

    pub fn has_warning(&self) -> bool {
        self.has_warning.load(Ordering::SeqCst)
    }

    pub fn get_errors_and_consume(&self) -> Option<Vec<Error>> {
        if !self.has_error() {
            return None;
        }

        let mut error_list = self.errors.lock().unwrap_or_else(PoisonError::into_inner);
        Some(error_list.drain(..).collect())
    }
}

fn log_error(
    has_error: Arc<AtomicBool>,
    errors: Arc<Mutex<VecDeque<Error>>>,
    e: Error,
    message: &str,
) {
    has_error.store(true, Ordering::SeqCst);

    let error = format!("{e:#}");
    error!(error = error, message);

    let mut error_list = errors.lock().unwrap_or_else(PoisonError::into_inner);
    error_list.push_back(e);
}

// A destination that is an existing directory, or any destination of a recursive download,
// receives the objects below it.
async fn prepare_download_root(config: &CopyConfig) -> Result<String> {
    let Some(file_url) = config.target.as_file() else {
        return Ok(String::new());
    };

    let mut root = file_url.path.clone();
    let ends_with_separator = root.ends_with('/') || root.ends_with(MAIN_SEPARATOR);
    if !ends_with_separator {
        let is_dir = tokio::fs::metadata(&root)
            .await
            .is_ok_and(|metadata| metadata.is_dir());
        if config.recursive || is_dir {
            root.push('/');
        }
    }

    if root.ends_with('/') || root.ends_with(MAIN_SEPARATOR) {
        tokio::fs::create_dir_all(&root)
            .await
            .with_context(|| format!("failed to create directory: {root}"))?;
    }

    Ok(root)
}
