//! Migration orchestrator - sequences the migration stages.
//!
//! A run moves strictly forward through [`Stage`]s. Connectivity, the
//! resolved table set and table creation are all-or-nothing; data, index and
//! foreign key failures are recorded per table or per item and the run
//! carries on.

mod progress;

pub use progress::{ProgressEvent, ProgressReporter};

use crate::config::{Config, MigrationConfig, SourceConfig, TargetMode};
use crate::error::{MigrateError, Result};
use crate::source::{RelationshipInfo, SourceReader, TableSchema};
use crate::target::{ddl, BatchCommit, ItemOutcome, MssqlTarget, OutcomeStatus, TargetWriter};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Migration stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    ConnectivityCheck,
    SchemaAnalysis,
    TableCreation,
    DataMigration,
    IndexCreation,
    ForeignKeyCreation,
    Summary,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::ConnectivityCheck => "connectivity check",
            Stage::SchemaAnalysis => "schema analysis",
            Stage::TableCreation => "table creation",
            Stage::DataMigration => "data migration",
            Stage::IndexCreation => "index creation",
            Stage::ForeignKeyCreation => "foreign key creation",
            Stage::Summary => "summary",
        };
        f.write_str(name)
    }
}

/// Final state of a run that reached the summary stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Cancelled,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Completed => f.write_str("completed"),
            RunStatus::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Per-table line of the run summary.
#[derive(Debug, Clone, Serialize)]
pub struct TableSummary {
    pub name: String,
    pub columns: usize,
    pub indexes: usize,
    /// Advisory row count taken during schema analysis.
    pub source_rows: i64,
    pub rows_migrated: u64,
    pub status: OutcomeStatus,
}

/// Result of a migration run.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationResult {
    /// Unique run identifier.
    pub run_id: String,

    /// Final status.
    pub status: RunStatus,

    /// When the migration started.
    pub started_at: DateTime<Utc>,

    /// When the migration completed.
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// Tables in the resolved working set, including ones skipped later.
    pub tables_total: usize,

    /// Tables whose data was fully transferred.
    pub tables_migrated: usize,

    /// Tables dropped during analysis or data migration.
    pub tables_skipped: usize,

    /// Total rows committed to the target.
    pub rows_transferred: u64,

    pub indexes_created: usize,
    pub indexes_failed: usize,

    /// Whether the foreign key stage ran.
    pub foreign_keys_enabled: bool,
    pub foreign_keys_created: usize,
    pub foreign_keys_failed: usize,

    pub tables: Vec<TableSummary>,
    pub index_outcomes: Vec<ItemOutcome>,
    pub foreign_key_outcomes: Vec<ItemOutcome>,

    /// Stages that ran to completion, in order.
    pub stages_completed: Vec<Stage>,

    /// Stages skipped by configuration or cancellation.
    pub stages_skipped: Vec<Stage>,
}

impl MigrationResult {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Completed
    }
}

/// What [`Orchestrator::execute`] reports, whatever happened.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<MigrationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Process exit code for this outcome.
    #[serde(skip)]
    pub exit_code: u8,
}

/// Health check result.
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckResult {
    pub source_connected: bool,
    pub source_latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_error: Option<String>,
    pub target_connected: bool,
    pub target_latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_error: Option<String>,
    pub healthy: bool,
}

/// DDL a run would execute, produced without touching the target.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationPlan {
    pub tables: Vec<TablePlan>,
    pub foreign_keys: Vec<String>,
    /// Tables and foreign keys left out of the plan, with the reason.
    pub skipped: Vec<(String, String)>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TablePlan {
    pub name: String,
    pub source_rows: i64,
    pub create_table: String,
    pub indexes: Vec<String>,
}

impl MigrationPlan {
    /// Render the plan as one SQL script, statements separated by `GO`.
    pub fn to_sql(&self) -> String {
        let mut statements: Vec<&str> = Vec::new();
        for table in &self.tables {
            statements.push(&table.create_table);
        }
        for table in &self.tables {
            statements.extend(table.indexes.iter().map(String::as_str));
        }
        statements.extend(self.foreign_keys.iter().map(String::as_str));

        let mut script = String::new();
        for sql in statements {
            script.push_str(sql);
            script.push_str("\nGO\n\n");
        }
        script
    }
}

/// Output of the schema analysis stage.
struct Analysis {
    tables: Vec<TableSchema>,
    skipped: Vec<(String, String)>,
    relationships: Vec<RelationshipInfo>,
}

/// Migration orchestrator.
pub struct Orchestrator {
    config: MigrationConfig,
    source: Arc<dyn SourceReader>,
    target: Arc<dyn TargetWriter>,
    progress: ProgressReporter,
}

impl Orchestrator {
    pub fn new(
        config: MigrationConfig,
        source: Arc<dyn SourceReader>,
        target: Arc<dyn TargetWriter>,
    ) -> Self {
        Self {
            config,
            source,
            target,
            progress: ProgressReporter::none(),
        }
    }

    /// Build an orchestrator for the Access source and SQL Server target in `config`.
    ///
    /// No connection is opened here; the first stage of [`run`](Self::run)
    /// does that.
    pub fn connect(config: &Config) -> Result<Self> {
        config.validate()?;
        let source = open_source(&config.source)?;
        let target: Arc<dyn TargetWriter> = Arc::new(MssqlTarget::new(&config.target));
        Ok(Self::new(config.migration.clone(), source, target))
    }

    /// Send progress events to `tx`.
    pub fn with_progress(mut self, tx: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        self.progress = ProgressReporter::new(tx);
        self
    }

    /// Check both sides independently.
    pub async fn health_check(&self) -> HealthCheckResult {
        let start = Instant::now();
        let source = self.source.test_connection().await;
        let source_latency_ms = start.elapsed().as_millis() as u64;

        let start = Instant::now();
        let target = self.target.test_connection().await;
        let target_latency_ms = start.elapsed().as_millis() as u64;

        HealthCheckResult {
            healthy: source.is_ok() && target.is_ok(),
            source_connected: source.is_ok(),
            source_latency_ms,
            source_error: source.err().map(|e| e.to_string()),
            target_connected: target.is_ok(),
            target_latency_ms,
            target_error: target.err().map(|e| e.to_string()),
        }
    }

    /// Run the migration, converting every failure (panics included) into
    /// a reported outcome.
    pub async fn execute(&self, cancel: CancellationToken) -> MigrationOutcome {
        match AssertUnwindSafe(self.run(cancel)).catch_unwind().await {
            Ok(Ok(result)) => MigrationOutcome {
                success: result.is_success(),
                exit_code: if result.is_success() {
                    0
                } else {
                    MigrateError::Cancelled.exit_code()
                },
                result: Some(result),
                error: None,
            },
            Ok(Err(e)) => {
                error!("Migration failed: {}", e);
                MigrationOutcome {
                    success: false,
                    exit_code: e.exit_code(),
                    result: None,
                    error: Some(e.format_detailed()),
                }
            }
            Err(panic) => {
                let detail = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic payload".to_string());
                let e = MigrateError::Internal(format!("migration panicked: {}", detail));
                error!("{}", e);
                MigrationOutcome {
                    success: false,
                    exit_code: e.exit_code(),
                    result: None,
                    error: Some(e.format_detailed()),
                }
            }
        }
    }

    /// Run all stages.
    pub async fn run(&self, cancel: CancellationToken) -> Result<MigrationResult> {
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        info!("Starting migration run: {}", run_id);

        let mut stages_completed = Vec::new();
        let mut stages_skipped = Vec::new();

        // Stage 1: connectivity
        self.stage_started(Stage::ConnectivityCheck);
        self.check_connectivity().await?;
        self.stage_completed(Stage::ConnectivityCheck, 2, 0);
        stages_completed.push(Stage::ConnectivityCheck);

        // Stage 2: schema analysis
        self.stage_started(Stage::SchemaAnalysis);
        let analysis = self.analyze().await?;
        self.stage_completed(
            Stage::SchemaAnalysis,
            analysis.tables.len(),
            analysis.skipped.len(),
        );
        stages_completed.push(Stage::SchemaAnalysis);

        let mut tables: Vec<TableSummary> = analysis
            .skipped
            .iter()
            .map(|(name, reason)| TableSummary {
                name: name.clone(),
                columns: 0,
                indexes: 0,
                source_rows: 0,
                rows_migrated: 0,
                status: OutcomeStatus::Skipped(reason.clone()),
            })
            .collect();

        // Stage 3: table creation
        self.stage_started(Stage::TableCreation);
        self.create_tables(&analysis.tables).await?;
        self.stage_completed(Stage::TableCreation, analysis.tables.len(), 0);
        stages_completed.push(Stage::TableCreation);

        // Stage 4: data
        self.stage_started(Stage::DataMigration);
        let (migrated, cancelled) = self.migrate_data(&analysis.tables, &cancel).await;
        let migrated_ok = migrated.iter().filter(|t| t.status == OutcomeStatus::Success).count();
        self.stage_completed(
            Stage::DataMigration,
            migrated_ok,
            analysis.tables.len() - migrated_ok,
        );
        stages_completed.push(Stage::DataMigration);
        tables.extend(migrated);

        // Stage 5: indexes
        let mut index_outcomes = Vec::new();
        if let Some(reason) = self.skip_reason(self.config.create_indexes, cancelled) {
            self.stage_skipped(Stage::IndexCreation, reason);
            stages_skipped.push(Stage::IndexCreation);
        } else {
            self.stage_started(Stage::IndexCreation);
            index_outcomes = self.create_indexes(&analysis.tables).await;
            let ok = index_outcomes.iter().filter(|o| o.is_success()).count();
            self.stage_completed(Stage::IndexCreation, ok, index_outcomes.len() - ok);
            stages_completed.push(Stage::IndexCreation);
        }

        // Stage 6: foreign keys
        let mut foreign_key_outcomes = Vec::new();
        let fk_skip_reason = self.skip_reason(self.config.create_foreign_keys, cancelled);
        if let Some(reason) = &fk_skip_reason {
            self.stage_skipped(Stage::ForeignKeyCreation, reason.clone());
            stages_skipped.push(Stage::ForeignKeyCreation);
        } else {
            self.stage_started(Stage::ForeignKeyCreation);
            foreign_key_outcomes = self.create_foreign_keys(&analysis.relationships).await;
            let ok = foreign_key_outcomes.iter().filter(|o| o.is_success()).count();
            self.stage_completed(
                Stage::ForeignKeyCreation,
                ok,
                foreign_key_outcomes.len() - ok,
            );
            stages_completed.push(Stage::ForeignKeyCreation);
        }

        // Stage 7: summary
        self.stage_started(Stage::Summary);
        let completed_at = Utc::now();
        let duration = (completed_at - started_at).num_milliseconds() as f64 / 1000.0;
        let indexes_created = index_outcomes.iter().filter(|o| o.is_success()).count();
        let foreign_keys_created = foreign_key_outcomes.iter().filter(|o| o.is_success()).count();
        let tables_migrated = tables
            .iter()
            .filter(|t| t.status == OutcomeStatus::Success)
            .count();
        stages_completed.push(Stage::Summary);

        let result = MigrationResult {
            run_id,
            status: if cancelled {
                RunStatus::Cancelled
            } else {
                RunStatus::Completed
            },
            started_at,
            completed_at,
            duration_seconds: duration,
            tables_total: tables.len(),
            tables_migrated,
            tables_skipped: tables.len() - tables_migrated,
            rows_transferred: tables.iter().map(|t| t.rows_migrated).sum(),
            indexes_created,
            indexes_failed: index_outcomes.len() - indexes_created,
            foreign_keys_enabled: fk_skip_reason.is_none(),
            foreign_keys_created,
            foreign_keys_failed: foreign_key_outcomes.len() - foreign_keys_created,
            tables,
            index_outcomes,
            foreign_key_outcomes,
            stages_completed,
            stages_skipped,
        };

        self.log_summary(&result);
        self.stage_completed(Stage::Summary, 1, 0);
        self.progress.emit(ProgressEvent::Finished {
            status: result.status.to_string(),
            tables_migrated: result.tables_migrated,
            rows_transferred: result.rows_transferred,
        });

        Ok(result)
    }

    /// Analyze the source and render the DDL a run would execute.
    pub async fn plan(&self) -> Result<MigrationPlan> {
        self.source.test_connection().await.map_err(|e| match e {
            e @ MigrateError::Connection { .. } => e,
            other => MigrateError::connection(other, "testing Access source connection"),
        })?;
        let analysis = self.analyze().await?;

        let tables = analysis
            .tables
            .iter()
            .map(|t| TablePlan {
                name: t.name.clone(),
                source_rows: t.row_count,
                create_table: ddl::create_table_sql(t),
                indexes: if self.config.create_indexes {
                    t.secondary_indexes().filter_map(ddl::create_index_sql).collect()
                } else {
                    Vec::new()
                },
            })
            .collect();

        let mut skipped = analysis.skipped;
        let mut foreign_keys = Vec::new();
        for rel in &analysis.relationships {
            match rel.unsupported_reason() {
                Some(reason) => skipped.push((rel.constraint_name(), reason.to_string())),
                None => foreign_keys.push(ddl::foreign_key_sql(rel)),
            }
        }

        Ok(MigrationPlan {
            tables,
            foreign_keys,
            skipped,
        })
    }

    async fn check_connectivity(&self) -> Result<()> {
        info!("Stage 1: Checking connectivity");
        self.source.test_connection().await.map_err(|e| match e {
            e @ MigrateError::Connection { .. } => e,
            other => MigrateError::connection(other, "testing Access source connection"),
        })?;
        self.target.test_connection().await.map_err(|e| match e {
            e @ MigrateError::Connection { .. } => e,
            other => MigrateError::connection(other, "testing SQL Server target connection"),
        })?;
        Ok(())
    }

    /// Resolve the working set and describe each table.
    async fn analyze(&self) -> Result<Analysis> {
        info!("Stage 2: Analyzing source schema");
        let discovered = self
            .source
            .list_tables()
            .await
            .map_err(|e| MigrateError::SchemaExtraction(e.to_string()))?;
        let names = resolve_tables(&discovered, &self.config.tables);

        if names.is_empty() {
            return Err(MigrateError::NoTables(if self.config.tables.is_empty() {
                "source has no user tables".to_string()
            } else {
                format!(
                    "none of the configured tables exist in the source: {}",
                    self.config.tables.join(", ")
                )
            }));
        }
        info!("Found {} tables to migrate", names.len());

        let mut tables = Vec::with_capacity(names.len());
        let mut skipped = Vec::new();
        for name in names {
            match self.source.describe_table(&name).await {
                Ok(table) => {
                    debug!(
                        "{}: {} columns, {} indexes, ~{} rows",
                        table.name,
                        table.columns.len(),
                        table.indexes.len(),
                        table.row_count
                    );
                    self.progress.emit(ProgressEvent::TableAnalyzed {
                        table: table.name.clone(),
                        columns: table.columns.len(),
                        indexes: table.indexes.len(),
                        rows: table.row_count,
                    });
                    tables.push(table);
                }
                Err(e) => {
                    warn!("Skipping table {}: {}", name, e);
                    self.progress.emit(ProgressEvent::TableSkipped {
                        table: name.clone(),
                        stage: Stage::SchemaAnalysis,
                        reason: e.to_string(),
                    });
                    skipped.push((name, e.to_string()));
                }
            }
        }

        if tables.is_empty() {
            return Err(MigrateError::NoTables(
                "every table failed schema analysis".to_string(),
            ));
        }

        let relationships = if self.config.create_foreign_keys {
            self.load_relationships(&mut tables).await
        } else {
            Vec::new()
        };

        Ok(Analysis {
            tables,
            skipped,
            relationships,
        })
    }

    /// Every relationship the source reports, attached to its child table
    /// when that table is being migrated.
    ///
    /// Relationships reaching outside the working set are kept; the target
    /// decides whether they can be created.
    async fn load_relationships(&self, tables: &mut [TableSchema]) -> Vec<RelationshipInfo> {
        let all = match self.source.list_relationships().await {
            Ok(rels) => rels,
            Err(e) => {
                warn!("Could not read relationships, no foreign keys will be created: {}", e);
                return Vec::new();
            }
        };

        let in_set: HashSet<String> = tables.iter().map(|t| t.name.to_lowercase()).collect();
        for rel in &all {
            if !in_set.contains(&rel.parent_table.to_lowercase())
                || !in_set.contains(&rel.child_table.to_lowercase())
            {
                info!(
                    "Relationship {} ({} -> {}) reaches a table outside this run; it will still be attempted",
                    rel.constraint_name(),
                    rel.child_table,
                    rel.parent_table
                );
            }
            if let Some(child) = tables
                .iter_mut()
                .find(|t| t.name.eq_ignore_ascii_case(&rel.child_table))
            {
                child.relationships.push(rel.clone());
            }
        }
        all
    }

    async fn create_tables(&self, tables: &[TableSchema]) -> Result<()> {
        info!(
            "Stage 3: Creating target tables (mode: {:?})",
            self.config.target_mode
        );

        let mut existing = Vec::with_capacity(tables.len());
        for table in tables {
            let exists = self
                .target
                .table_exists(&table.name)
                .await
                .map_err(|e| MigrateError::table_creation(&table.name, e))?;
            existing.push(exists);
        }

        if self.config.target_mode == TargetMode::FailIfExists {
            if let Some((table, _)) = tables.iter().zip(&existing).find(|(_, e)| **e) {
                return Err(MigrateError::table_creation(
                    &table.name,
                    "table already exists in the target (target_mode: fail_if_exists)",
                ));
            }
        }

        for (table, exists) in tables.iter().zip(existing) {
            if exists {
                info!("Dropping existing target table {}", table.name);
                self.target
                    .drop_table(&table.name)
                    .await
                    .map_err(|e| MigrateError::table_creation(&table.name, e))?;
            }

            self.target.create_table(table).await.map_err(|e| match e {
                e @ MigrateError::TableCreation { .. } => e,
                other => MigrateError::table_creation(&table.name, other),
            })?;
            info!("Created table {} ({} columns)", table.name, table.columns.len());
            self.progress.emit(ProgressEvent::TableCreated {
                table: table.name.clone(),
                dropped_existing: exists,
            });
        }

        Ok(())
    }

    /// Transfer every table. Returns the per-table summaries and whether the
    /// run was cancelled.
    async fn migrate_data(
        &self,
        tables: &[TableSchema],
        cancel: &CancellationToken,
    ) -> (Vec<TableSummary>, bool) {
        info!("Stage 4: Migrating data");
        let mut summaries = Vec::with_capacity(tables.len());
        let mut cancelled = false;

        for table in tables {
            let mut summary = TableSummary {
                name: table.name.clone(),
                columns: table.columns.len(),
                indexes: table.secondary_indexes().count(),
                source_rows: table.row_count,
                rows_migrated: 0,
                status: OutcomeStatus::Success,
            };

            if cancelled || cancel.is_cancelled() {
                cancelled = true;
                summary.status = OutcomeStatus::Skipped("cancelled".to_string());
                summaries.push(summary);
                continue;
            }

            match self.migrate_table(table, cancel).await {
                Ok((rows, table_cancelled)) => {
                    summary.rows_migrated = rows;
                    if table_cancelled {
                        cancelled = true;
                        summary.status = OutcomeStatus::Skipped(format!(
                            "cancelled after {} rows",
                            rows
                        ));
                    } else {
                        info!("Migrated {} rows into {}", rows, table.name);
                        self.progress.emit(ProgressEvent::TableMigrated {
                            table: table.name.clone(),
                            rows,
                        });
                    }
                }
                Err(e) => {
                    warn!("Skipping data for table {}: {}", table.name, e);
                    if let MigrateError::Batch { rows_committed, .. } = &e {
                        summary.rows_migrated = *rows_committed;
                    }
                    self.progress.emit(ProgressEvent::TableSkipped {
                        table: table.name.clone(),
                        stage: Stage::DataMigration,
                        reason: e.to_string(),
                    });
                    summary.status = OutcomeStatus::Skipped(e.to_string());
                }
            }
            summaries.push(summary);
        }

        if cancelled {
            warn!("Migration cancelled during data migration");
        }
        (summaries, cancelled)
    }

    async fn migrate_table(
        &self,
        table: &TableSchema,
        cancel: &CancellationToken,
    ) -> Result<(u64, bool)> {
        let data = self.source.read_table(&table.name).await?;
        if data.is_empty() {
            debug!("{}: no rows to migrate", table.name);
            return Ok((0, false));
        }

        let progress = self.progress.clone();
        let name = table.name.clone();
        let on_commit = move |commit: BatchCommit| {
            progress.emit(ProgressEvent::BatchCommitted {
                table: name.clone(),
                batch: commit.batch,
                total_batches: commit.total_batches,
                rows_committed: commit.rows_committed,
            });
        };

        let summary = self
            .target
            .insert_batch(table, &data, self.config.batch_size, cancel, &on_commit)
            .await?;
        Ok((summary.rows, summary.cancelled))
    }

    async fn create_indexes(&self, tables: &[TableSchema]) -> Vec<ItemOutcome> {
        info!("Stage 5: Creating indexes");
        let mut outcomes = Vec::new();

        for table in tables {
            for outcome in self.target.create_indexes(&table.name, &table.indexes).await {
                self.progress.emit(match &outcome.status {
                    OutcomeStatus::Success => ProgressEvent::IndexCreated {
                        table: table.name.clone(),
                        index: outcome.name.clone(),
                    },
                    OutcomeStatus::Skipped(reason) => ProgressEvent::IndexFailed {
                        table: table.name.clone(),
                        index: outcome.name.clone(),
                        reason: reason.clone(),
                    },
                });
                outcomes.push(outcome);
            }
        }

        outcomes
    }

    async fn create_foreign_keys(&self, relationships: &[RelationshipInfo]) -> Vec<ItemOutcome> {
        info!("Stage 6: Creating foreign keys");
        let outcomes = self.target.create_foreign_keys(relationships).await;

        for outcome in &outcomes {
            self.progress.emit(match &outcome.status {
                OutcomeStatus::Success => ProgressEvent::ForeignKeyCreated {
                    name: outcome.name.clone(),
                },
                OutcomeStatus::Skipped(reason) => ProgressEvent::ForeignKeyFailed {
                    name: outcome.name.clone(),
                    reason: reason.clone(),
                },
            });
        }

        outcomes
    }

    fn skip_reason(&self, enabled: bool, cancelled: bool) -> Option<String> {
        if cancelled {
            Some("cancelled".to_string())
        } else if !enabled {
            Some("disabled by configuration".to_string())
        } else {
            None
        }
    }

    fn log_summary(&self, result: &MigrationResult) {
        info!("Stage 7: Summary");
        for table in &result.tables {
            match &table.status {
                OutcomeStatus::Success => info!(
                    "  {}: {} rows, {} columns, {} indexes",
                    table.name, table.rows_migrated, table.columns, table.indexes
                ),
                OutcomeStatus::Skipped(reason) => {
                    warn!("  {}: skipped ({})", table.name, reason)
                }
            }
        }
        info!(
            "Migration {}: {}/{} tables, {} rows, {} indexes ({} failed), foreign keys {} ({} created, {} failed) in {:.2}s",
            result.status,
            result.tables_migrated,
            result.tables_total,
            result.rows_transferred,
            result.indexes_created,
            result.indexes_failed,
            if result.foreign_keys_enabled { "enabled" } else { "disabled" },
            result.foreign_keys_created,
            result.foreign_keys_failed,
            result.duration_seconds
        );
    }

    fn stage_started(&self, stage: Stage) {
        debug!("Starting {}", stage);
        self.progress.emit(ProgressEvent::StageStarted { stage });
    }

    fn stage_completed(&self, stage: Stage, succeeded: usize, skipped: usize) {
        self.progress.emit(ProgressEvent::StageCompleted {
            stage,
            succeeded,
            skipped,
        });
    }

    fn stage_skipped(&self, stage: Stage, reason: String) {
        info!("Skipping {}: {}", stage, reason);
        self.progress.emit(ProgressEvent::StageSkipped { stage, reason });
    }
}

/// Intersect the allow-list with the discovered tables, ignoring case.
///
/// An empty allow-list selects everything. Names come back with the
/// source's spelling, in discovery order.
pub fn resolve_tables(discovered: &[String], allow_list: &[String]) -> Vec<String> {
    if allow_list.is_empty() {
        return discovered.to_vec();
    }

    for wanted in allow_list {
        if !discovered.iter().any(|d| d.eq_ignore_ascii_case(wanted)) {
            warn!("Configured table {} not found in source", wanted);
        }
    }

    discovered
        .iter()
        .filter(|d| allow_list.iter().any(|w| w.eq_ignore_ascii_case(d)))
        .cloned()
        .collect()
}

#[cfg(feature = "odbc")]
fn open_source(config: &SourceConfig) -> Result<Arc<dyn SourceReader>> {
    use crate::source::{AccessOdbcCatalog, Introspector};
    Ok(Arc::new(Introspector::new(AccessOdbcCatalog::new(config)?)))
}

#[cfg(not(feature = "odbc"))]
fn open_source(_config: &SourceConfig) -> Result<Arc<dyn SourceReader>> {
    Err(MigrateError::Config(
        "this build has no Access source support; rebuild with `--features odbc`".to_string(),
    ))
}
