mod aggregate;
mod config;
mod corpus;
mod db;
mod error;
mod metrics;
mod parser;
mod store;

use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::info;

use crate::config::Settings;
use crate::corpus::{Corpus, DocumentRef};
use crate::metrics::new_run_id;
use crate::store::{MasterRow, MasterTable};

#[derive(Parser)]
#[command(name = "qscan", about = "Keyword extraction over questionnaire documents")]
struct Cli {
    /// Settings file (default: ./qscan.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema
    Init,
    /// Load master metadata from a JSON array of objects
    ImportMaster {
        file: PathBuf,
        /// Column holding the identifier (default: settings, then first column)
        #[arg(long)]
        id_column: Option<String>,
    },
    /// Match corpus documents to master identifiers and save keyword records
    Scan {
        /// Corpus folder (default: corpus_dir setting)
        #[arg(long)]
        corpus: Option<PathBuf>,
        /// Max identifiers to scan (default: all)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Scan only this identifier (repeatable)
        #[arg(long = "id")]
        ids: Vec<String>,
    },
    /// Extract the section question list of every corpus document
    Questions {
        #[arg(long)]
        corpus: Option<PathBuf>,
    },
    /// Print one document's extraction result as JSON
    Inspect { file: PathBuf },
    /// Write saved records as JSON lines
    Export {
        /// Output file (default: stdout)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Show row counts and the latest run
    Stats,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;
    info!(db = %settings.db_path.display(), keywords = ?settings.keywords, "Settings loaded");

    let result = match cli.command {
        Commands::Init => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            println!("Schema ready at {}", settings.db_path.display());
            Ok(())
        }
        Commands::ImportMaster { file, id_column } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("cannot read {}", file.display()))?;
            let id_column = id_column.or_else(|| settings.id_column.clone());
            let table = MasterTable::from_json(&text, id_column.as_deref())?;
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let saved = db::save_master(&conn, &table)?;
            println!("Imported {} master rows from {}", saved, file.display());
            Ok(())
        }
        Commands::Scan { corpus, limit, ids } => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let master = db::load_master(&conn)?;
            if master.is_empty() {
                println!("No master rows. Run 'import-master' first.");
                return Ok(());
            }
            let rows = select_rows(&master, &ids, limit)?;

            let dir = corpus_dir(corpus, &settings)?;
            let corpus = Corpus::scan(&dir)?;
            let vocab = settings.vocabulary()?;
            let run_id = new_run_id();

            println!(
                "Scanning {} identifiers against {} documents...",
                rows.len(),
                corpus.len()
            );
            let tally = aggregate::aggregate_corpus(
                &vocab,
                &rows,
                &corpus,
                settings.batch_size,
                |chunk| {
                    db::save_records(&conn, &run_id, chunk)?;
                    Ok(())
                },
            )?;
            db::save_run(&conn, &run_id, "scan", &tally)?;

            tally.print();
            if !corpus.unmatched().is_empty() {
                println!(
                    "{} documents have no identifier in their file name.",
                    corpus.unmatched().len()
                );
            }
            println!("Run: {}", run_id);
            Ok(())
        }
        Commands::Questions { corpus } => {
            let dir = corpus_dir(corpus, &settings)?;
            let corpus = Corpus::scan(&dir)?;
            if corpus.is_empty() {
                println!("No documents in {}.", dir.display());
                return Ok(());
            }
            let vocab = settings.vocabulary()?;
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;

            println!("Extracting questions from {} documents...", corpus.len());
            let (rows, tally) = aggregate::collect_questions(&vocab, &corpus, settings.batch_size);
            let inserted = db::save_questions(&conn, &rows)?;
            let run_id = new_run_id();
            db::save_run(&conn, &run_id, "questions", &tally)?;

            println!(
                "Found {} questions in {} documents ({} skipped); {} new.",
                rows.len(),
                tally.documents_processed,
                tally.documents_skipped,
                inserted
            );
            Ok(())
        }
        Commands::Inspect { file } => {
            let Some(doc) = DocumentRef::new(file.clone()) else {
                bail!("unsupported document type: {}", file.display());
            };
            let loaded = corpus::load_document(&doc)?;
            let extraction = parser::process_document(&settings.vocabulary()?, &loaded);
            println!("{}", serde_json::to_string_pretty(&extraction)?);
            Ok(())
        }
        Commands::Export { out } => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let records = db::fetch_records(&conn)?;
            let count = records.len();
            match &out {
                Some(path) => {
                    let file = std::fs::File::create(path)
                        .with_context(|| format!("cannot create {}", path.display()))?;
                    write_json_lines(BufWriter::new(file), &records)?;
                    println!("Exported {} records to {}", count, path.display());
                }
                None => write_json_lines(BufWriter::new(std::io::stdout().lock()), &records)?,
            }
            Ok(())
        }
        Commands::Stats => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn)?;
            println!("Master rows:  {}", s.master_rows);
            println!("Records:      {}", s.records);
            println!("Placeholders: {}", s.placeholder_records);
            println!("Identifiers:  {}", s.identifiers_with_records);
            println!("Answers:      {}", s.answered_fields);
            println!("Questions:    {}", s.questions);
            println!("Runs:         {}", s.runs);
            if let Some(run) = db::latest_run(&conn)? {
                println!("\n--- Latest run: {} ({}, {}) ---", run.run_id, run.command, run.finished_at);
                run.tally.print();
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        eprintln!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn corpus_dir(flag: Option<PathBuf>, settings: &Settings) -> anyhow::Result<PathBuf> {
    match flag.or_else(|| settings.corpus_dir.clone()) {
        Some(dir) => Ok(dir),
        None => bail!("no corpus folder: pass --corpus or set corpus_dir"),
    }
}

/// Master rows to scan, in master order. Unknown `ids` are an error.
fn select_rows(master: &MasterTable, ids: &[String], limit: Option<usize>) -> anyhow::Result<Vec<MasterRow>> {
    if let Some(missing) = ids.iter().find(|id| master.get(id).is_none()) {
        bail!("identifier {} is not in the master table", missing);
    }
    let mut rows: Vec<MasterRow> = master
        .rows()
        .iter()
        .filter(|r| ids.is_empty() || ids.contains(&r.identifier))
        .cloned()
        .collect();
    if let Some(n) = limit {
        rows.truncate(n);
    }
    Ok(rows)
}

fn write_json_lines<W: Write>(mut w: W, records: &[aggregate::CorpusRecord]) -> anyhow::Result<()> {
    for r in records {
        serde_json::to_writer(&mut w, r)?;
        w.write_all(b"\n")?;
    }
    w.flush()?;
    Ok(())
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::extract::answers::FieldAnswer;
    use serde_json::{json, Map};
    use std::path::Path;

    #[test]
    fn json_lines_one_record_per_line() {
        let mut metadata = Map::new();
        metadata.insert("Title".into(), json!("Pilot"));
        let record = aggregate::CorpusRecord {
            identifier: "12".into(),
            metadata,
            keyword: "Blis".into(),
            location: "2.1".into(),
            question: Some("Who receives data?".into()),
            response: Some("Blis does.".into()),
            source_document: "Pilot_12.pdf".into(),
            answers: vec![FieldAnswer {
                field: "Contain Personal Data".into(),
                answer: Some("Yes".into()),
            }],
        };

        let mut buf = Vec::new();
        write_json_lines(&mut buf, &[record.clone(), record]).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: aggregate::CorpusRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed.location, "2.1");
        assert_eq!(parsed.answers[0].answer.as_deref(), Some("Yes"));
    }

    #[test]
    fn scan_selection_keeps_master_order() {
        let master = MasterTable::from_json(
            r#"[{"Id": "3"}, {"Id": "1"}, {"Id": "2"}]"#,
            Some("Id"),
        )
        .unwrap();
        let ids = |rows: Vec<MasterRow>| rows.into_iter().map(|r| r.identifier).collect::<Vec<_>>();

        assert_eq!(ids(select_rows(&master, &[], Some(2)).unwrap()), vec!["3", "1"]);
        assert_eq!(
            ids(select_rows(&master, &["2".into(), "3".into()], None).unwrap()),
            vec!["3", "2"]
        );
        assert!(select_rows(&master, &["9".into()], None).is_err());
    }

    #[test]
    fn corpus_dir_prefers_flag() {
        let settings = Settings {
            corpus_dir: Some(PathBuf::from("from-settings")),
            ..Settings::default()
        };
        assert_eq!(
            corpus_dir(Some(PathBuf::from("from-flag")), &settings).unwrap(),
            Path::new("from-flag")
        );
        assert_eq!(corpus_dir(None, &settings).unwrap(), Path::new("from-settings"));
        assert!(corpus_dir(None, &Settings::default()).is_err());
    }

    #[test]
    fn durations() {
        assert_eq!(format_duration(std::time::Duration::from_secs(75)), "1m 15s");
        assert_eq!(format_duration(std::time::Duration::from_secs(3725)), "1h 2m 5s");
    }
}
