use anyhow::{anyhow, bail, Context};
use clap::Args;
use linkgrid_core::db::open_db;
use linkgrid_core::{
    grid, init_logging_from_config, parse_entity_list, AssociationKind, CommitOutcome, CoreConfig,
    EntityId, MatrixScope, MatrixSession, SqliteLinkRepository,
};
use log::info;
use std::path::{Path, PathBuf};

#[derive(Args)]
pub struct ScopeArgs {
    /// SQLite database file.
    #[arg(long)]
    db: PathBuf,

    /// Association kind, e.g. `chapter_learning_outcome` or `program_objective_plo`.
    #[arg(long, value_parser = parse_kind)]
    kind: AssociationKind,

    /// Parent entity that scopes rows and columns.
    #[arg(long)]
    parent: EntityId,
}

impl ScopeArgs {
    fn scope(&self) -> MatrixScope {
        MatrixScope {
            kind: self.kind,
            parent_id: self.parent,
        }
    }

    fn open_repo(&self) -> anyhow::Result<SqliteLinkRepository> {
        let conn = open_db(&self.db)
            .with_context(|| format!("failed to open database {}", self.db.display()))?;
        Ok(SqliteLinkRepository::try_new(conn)?)
    }
}

#[derive(Args)]
pub struct SeedArgs {
    #[command(flatten)]
    scope: ScopeArgs,

    /// JSON document with `rows` and `columns` payloads.
    #[arg(long)]
    file: PathBuf,
}

#[derive(Args)]
pub struct ShowArgs {
    #[command(flatten)]
    scope: ScopeArgs,
}

#[derive(Args)]
pub struct ApplyArgs {
    #[command(flatten)]
    scope: ScopeArgs,

    /// Cell to toggle as `ROW:COLUMN`; repeatable.
    #[arg(long = "toggle", value_parser = parse_cell, required = true)]
    toggles: Vec<(EntityId, EntityId)>,
}

/// Loads the optional config file and starts file logging when it names a directory.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<CoreConfig> {
    let Some(path) = path else {
        return Ok(CoreConfig::default());
    };
    let config = CoreConfig::from_file(path)
        .with_context(|| format!("failed to load config {}", path.display()))?;
    init_logging_from_config(&config).map_err(|err| anyhow!(err))?;
    Ok(config)
}

pub fn seed(args: SeedArgs) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let document: serde_json::Value = serde_json::from_str(&text)?;

    let scope = args.scope.scope();
    let link_field = scope.kind.embedded_field();
    let rows = parse_entity_list(&document, "rows", link_field).context("invalid `rows`")?;
    let columns =
        parse_entity_list(&document, "columns", link_field).context("invalid `columns`")?;

    let summary = args.scope.open_repo()?.import_scope(scope, &rows, &columns)?;
    println!(
        "seeded {scope}: rows={} columns={} links={} dropped_links={}",
        summary.rows, summary.columns, summary.links, summary.dropped_links
    );
    Ok(())
}

pub async fn show(args: ShowArgs, config: &CoreConfig) -> anyhow::Result<()> {
    let scope = args.scope.scope();
    let mut session = MatrixSession::new(args.scope.open_repo()?, scope, &config.commit);
    session.load().await?;

    let matrix = session.matrix();
    let header: Vec<&str> = matrix.columns().iter().map(|c| c.code.as_str()).collect();
    println!("{scope}\t{}", header.join("\t"));
    for row in grid(matrix) {
        let cells: Vec<&str> = row
            .cells
            .iter()
            .map(|cell| if cell.linked { "x" } else { "." })
            .collect();
        println!("{}\t{}", row.code, cells.join("\t"));
    }
    Ok(())
}

pub async fn apply(args: ApplyArgs, config: &CoreConfig) -> anyhow::Result<()> {
    let scope = args.scope.scope();
    let mut session = MatrixSession::new(args.scope.open_repo()?, scope, &config.commit);
    session.load().await?;

    for (row_id, column_id) in &args.toggles {
        let linked = session.toggle(*row_id, *column_id)?;
        info!(
            "event=cli_toggle module=cli status=ok scope={} row_id={} column_id={} linked={}",
            scope, row_id, column_id, linked
        );
    }

    let outcome = session.commit().await?;
    println!("{}", outcome.user_message());
    if let CommitOutcome::Failed(report) = &outcome {
        for call in report.failed_calls() {
            println!("  row {} {:?} {:?} failed", call.row_id, call.op, call.column_ids);
        }
        bail!(
            "{} of {} calls failed",
            report.failed_calls().count(),
            report.calls.len()
        );
    }
    Ok(())
}

fn parse_kind(value: &str) -> Result<AssociationKind, String> {
    AssociationKind::parse(value).ok_or_else(|| {
        let known: Vec<&str> = AssociationKind::ALL.iter().map(|k| k.as_str()).collect();
        format!("unknown kind `{value}`; expected one of {}", known.join(", "))
    })
}

fn parse_cell(value: &str) -> Result<(EntityId, EntityId), String> {
    let (row, column) = value
        .split_once(':')
        .ok_or_else(|| format!("expected ROW:COLUMN, got `{value}`"))?;
    let row = row.trim().parse().map_err(|_| format!("invalid row id `{row}`"))?;
    let column = column
        .trim()
        .parse()
        .map_err(|_| format!("invalid column id `{column}`"))?;
    Ok((row, column))
}
