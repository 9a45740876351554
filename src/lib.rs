/*!
# Overview
ossbulk moves large populations of files and objects between a local filesystem and an
object storage service, and removes objects, multipart uploads and buckets in bulk.

## Features
- Concurrent pipeline
  Sources are enumerated, filtered and dispatched to a pool of workers. Each worker runs
  the network calls of one item at a time.

- Resumable large transfers
  Objects at or above `--bigfile-threshold` are transferred in parts. Every completed part is
  recorded in a checkpoint, so an interrupted upload, download or copy continues with the
  missing parts only.

- Incremental transfers
  `--update` skips items whose destination is not older than the source. `--snapshot-path`
  remembers what earlier runs transferred and skips unchanged items without asking the
  service.

- Filtering
  `--include`/`--exclude` glob patterns on the file name, `--start-time`/`--end-time` on
  the modification time.

- Bulk removal
  Objects below a prefix, in-progress multipart uploads, or both, optionally followed by
  the bucket itself.

## As a library
The CLI is a thin wrapper of the library. The object storage is a directory tree below
`--storage-root`, one directory per bucket.

```no_run
use ossbulk::config::args::build_config_from_args;
use ossbulk::pipeline::Pipeline;
use ossbulk::types::create_pipeline_cancellation_token;

#[tokio::main]
async fn main() {
    let args = vec!["ossbulk", "cp", "-r", "./data", "oss://bucket1/data/"];
    let config = build_config_from_args(args).unwrap();

    let cancellation_token = create_pipeline_cancellation_token();
    let mut pipeline = Pipeline::new(config, cancellation_token);

    pipeline.run().await;

    if let Some(line) = pipeline.monitor().finish_line(ossbulk::monitor::ExitStatus::Normal) {
        println!("{line}");
    }
    if pipeline.has_error() {
        println!("An error has occurred.");
        println!("{:?}", pipeline.get_errors_and_consume().unwrap()[0]);
    }
}
```
*/

pub use config::Config;
pub use config::args::CLIArgs;

pub mod config;
pub mod monitor;
pub mod pipeline;
pub mod storage;
pub mod store;
pub mod types;
