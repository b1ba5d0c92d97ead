pub mod backup;
pub mod download;
pub mod fsops;
pub mod notification;
pub mod process;
pub mod retry;
pub mod update;

pub use backup::{BackupInfo, BackupService};
pub use download::{DownloadProvider, DownloadSession, DownloadStatus};
pub use notification::{NotificationSink, NotifyKind};
pub use process::ProcessController;
pub use update::ServerUpdateService;
