//! Structured progress events emitted while a migration runs.

use super::Stage;
use serde::Serialize;
use tokio::sync::mpsc;

/// One observable step of a migration run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    StageStarted {
        stage: Stage,
    },
    StageCompleted {
        stage: Stage,
        succeeded: usize,
        skipped: usize,
    },
    StageSkipped {
        stage: Stage,
        reason: String,
    },
    TableAnalyzed {
        table: String,
        columns: usize,
        indexes: usize,
        rows: i64,
    },
    TableSkipped {
        table: String,
        stage: Stage,
        reason: String,
    },
    TableCreated {
        table: String,
        dropped_existing: bool,
    },
    BatchCommitted {
        table: String,
        batch: usize,
        total_batches: usize,
        rows_committed: u64,
    },
    TableMigrated {
        table: String,
        rows: u64,
    },
    IndexCreated {
        table: String,
        index: String,
    },
    IndexFailed {
        table: String,
        index: String,
        reason: String,
    },
    ForeignKeyCreated {
        name: String,
    },
    ForeignKeyFailed {
        name: String,
        reason: String,
    },
    Finished {
        status: String,
        tables_migrated: usize,
        rows_transferred: u64,
    },
}

/// Sends progress events to an optional subscriber.
///
/// Emitting never blocks and never fails; events are dropped when nobody
/// is listening.
#[derive(Debug, Clone, Default)]
pub struct ProgressReporter {
    tx: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

impl ProgressReporter {
    pub fn new(tx: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Reporter with no subscriber.
    pub fn none() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: ProgressEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json_shape() {
        let event = ProgressEvent::BatchCommitted {
            table: "Orders".into(),
            batch: 2,
            total_batches: 5,
            rows_committed: 2000,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "batch_committed");
        assert_eq!(json["table"], "Orders");
        assert_eq!(json["rows_committed"], 2000);

        let json = serde_json::to_value(ProgressEvent::StageStarted {
            stage: Stage::DataMigration,
        })
        .unwrap();
        assert_eq!(json["stage"], "data_migration");
    }

    #[test]
    fn test_reporter_delivers_and_tolerates_closed_channel() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let reporter = ProgressReporter::new(tx);
        reporter.emit(ProgressEvent::ForeignKeyCreated {
            name: "FK_Orders_Customers".into(),
        });
        assert!(matches!(
            rx.try_recv(),
            Ok(ProgressEvent::ForeignKeyCreated { .. })
        ));

        drop(rx);
        reporter.emit(ProgressEvent::ForeignKeyCreated { name: "x".into() });
        ProgressReporter::none().emit(ProgressEvent::ForeignKeyCreated { name: "y".into() });
    }
}
