use anyhow::{Context, Result, bail};
use clap::{CommandFactory, Parser};
use corpusmill::classify::classify_ledger;
use corpusmill::cli::{Cli, Commands};
use corpusmill::config::Config;
use corpusmill::consolidate::{
    ConsolidationReport, Consolidator, consolidate_by_dialect, consolidate_into_shards,
    corpus_ledger_path, corpus_store_path,
};
use corpusmill::import::{CorpusImporter, ImportEntry, KeyStyle, load_speaker_metadata, load_table};
use corpusmill::segment::{EpisodeSummary, RecordingSegmenter};
use corpusmill::store::{BlobFileBackend, inspect};
use owo_colors::OwoColorize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(&cli);

    match cli.command {
        Commands::Segment { dataset, episodes } => {
            let config = load_config(cli.config.as_deref())?;
            segment(&config, &dataset, &episodes)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Classify {
            dataset,
            group_max_secs,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let classifier = config.classification.classifier()?;
            let ledger = corpus_ledger_path(&config.paths.recordings_dir, &dataset);
            let summary = classify_ledger(
                &ledger,
                &classifier,
                group_max_secs.unwrap_or(config.classification.group_max_secs),
            )
            .with_context(|| format!("Failed to classify {}", ledger.display()))?;
            println!(
                "{} {} speakers in {} groups, {} records labelled, {} without phonemes",
                "Classified".green(),
                summary.speakers,
                summary.groups,
                summary.labelled,
                summary.unclassifiable
            );
            Ok(ExitCode::SUCCESS)
        }
        Commands::Import {
            dataset,
            manifests,
            audio_dir,
            keys,
            speaker,
            dialect,
            canton,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let source = ImportSource {
                audio_dir,
                style: keys.unwrap_or_default(),
                speaker,
                dialect,
                canton,
            };
            import(&config, &dataset, &manifests, &source)
        }
        Commands::ToDialects {
            dataset,
            schema,
            max_workers,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let backend = BlobFileBackend;
            let consolidator = Consolidator::new(&backend, config.dialect_layout())
                .with_max_workers(max_workers.unwrap_or(config.consolidation.max_workers));
            let filter = config.consolidation.eligibility_filter();
            let report = consolidate_by_dialect(&consolidator, &dataset, schema, &filter)?;
            Ok(print_report(&report, cli.quiet))
        }
        Commands::ToShards {
            datasets,
            distributed,
            shards,
            schema,
            max_workers,
        } => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(count) = shards {
                config.sharding.shard_count = count;
            }
            let planner = config.sharding.planner()?;
            let distributed = distributed.or_else(|| config.sharding.distributed_corpus.clone());

            let backend = BlobFileBackend;
            let consolidator = Consolidator::new(&backend, config.shard_layout())
                .with_max_workers(max_workers.unwrap_or(config.consolidation.max_workers));
            let filter = config.consolidation.eligibility_filter();
            let report = consolidate_into_shards(
                &consolidator,
                &datasets,
                distributed.as_deref(),
                schema,
                &planner,
                &filter,
            )?;
            Ok(print_report(&report, cli.quiet))
        }
        Commands::Inspect { store } => {
            let summaries = inspect(&BlobFileBackend, &store)
                .with_context(|| format!("Failed to inspect {}", store.display()))?;
            println!("{} ({} keys)", store.display().bold(), summaries.len());
            for summary in &summaries {
                println!(
                    "  {}  {} samples  [{}]",
                    summary.key,
                    summary.payload_len,
                    summary.attributes.join(", ").dimmed()
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Completions { shell } => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "corpusmill",
                &mut std::io::stdout(),
            );
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn init_logging(cli: &Cli) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("corpusmill={}", cli.log_level())));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(custom_path: Option<&Path>) -> Result<Config> {
    let config = if let Some(path) = custom_path {
        Config::load(path)?
    } else {
        Config::load_or_default(&Config::default_path()?)?
    };

    Ok(config.with_env_overrides())
}

fn segment(config: &Config, dataset: &str, episodes: &[String]) -> Result<()> {
    let dir = &config.paths.recordings_dir;
    let backend = BlobFileBackend;
    let segmenter = RecordingSegmenter::new(
        &backend,
        dataset,
        &corpus_store_path(dir, dataset),
        &corpus_ledger_path(dir, dataset),
    )
    .with_sample_rate(config.segmentation.sample_rate)
    .with_first_id(config.segmentation.first_sample_id);

    let episode_dir = dir.join(dataset);
    let mut total = EpisodeSummary::default();
    for episode in episodes {
        let summary = segmenter
            .segment_files(
                episode,
                &episode_dir.join(format!("{}.json", episode)),
                &episode_dir.join(format!("{}.wav", episode)),
            )
            .with_context(|| format!("Failed to segment episode {}", episode))?;
        total.merge(summary);
    }

    println!(
        "{} {} samples written, {} already present, {} outside the audio",
        "Segmented".green(),
        total.written,
        total.skipped + total.ledger_repaired,
        total.out_of_range
    );
    Ok(())
}

struct ImportSource {
    audio_dir: Option<PathBuf>,
    style: KeyStyle,
    speaker: Option<String>,
    dialect: Option<String>,
    canton: Option<String>,
}

impl ImportSource {
    fn entries(&self, config: &Config, manifest: &Path) -> Result<Vec<ImportEntry>> {
        let regions = config.import.regions();
        if manifest.extension().is_some_and(|ext| ext == "tsv") {
            let audio_dir = match &self.audio_dir {
                Some(dir) => dir.clone(),
                None => manifest.parent().unwrap_or(Path::new("")).to_path_buf(),
            };
            let table = load_table(manifest, &audio_dir, &regions, self.style)?;
            if table.unlabelled + table.unknown_canton > 0 {
                println!(
                    "  {} {}: {} rows without dialect, {} with unknown canton",
                    "!".yellow(),
                    manifest.display(),
                    table.unlabelled,
                    table.unknown_canton
                );
            }
            return Ok(table.entries);
        }

        let (speaker, dialect) = match (&self.speaker, &self.dialect, &self.canton) {
            (speaker, _, Some(canton)) => {
                let Some(region) = regions.region(canton) else {
                    bail!("Unknown canton '{}'", canton);
                };
                let speaker = speaker
                    .clone()
                    .unwrap_or_else(|| format!("SPEAKER_ch_{}", canton.to_lowercase()));
                (speaker, region.to_string())
            }
            (Some(speaker), Some(dialect), None) => (speaker.clone(), dialect.clone()),
            _ => bail!(
                "{} needs --canton, or --speaker with --dialect",
                manifest.display()
            ),
        };
        Ok(load_speaker_metadata(manifest, &speaker, &dialect, self.style)?)
    }
}

fn import(
    config: &Config,
    dataset: &str,
    manifests: &[PathBuf],
    source: &ImportSource,
) -> Result<ExitCode> {
    let mut entries = Vec::new();
    for manifest in manifests {
        let loaded = source
            .entries(config, manifest)
            .with_context(|| format!("Failed to read manifest {}", manifest.display()))?;
        entries.extend(loaded);
    }

    let dir = &config.paths.recordings_dir;
    let backend = BlobFileBackend;
    let summary = CorpusImporter::new(
        &backend,
        dataset,
        &corpus_store_path(dir, dataset),
        &corpus_ledger_path(dir, dataset),
    )
    .with_sample_rate(config.segmentation.sample_rate)
    .import(&entries)?;

    println!(
        "{} {} clips imported, {} already present",
        "Imported".green(),
        summary.imported,
        summary.skipped + summary.ledger_repaired
    );
    if summary.failed.is_empty() {
        Ok(ExitCode::SUCCESS)
    } else {
        eprintln!(
            "{}",
            format!(
                "{} clips could not be read: {}",
                summary.failed.len(),
                summary.failed.join(", ")
            )
            .red()
        );
        Ok(ExitCode::FAILURE)
    }
}

fn print_report(report: &ConsolidationReport, quiet: bool) -> ExitCode {
    if !quiet {
        for partition in &report.partitions {
            match &partition.result {
                Ok(outcome) if outcome.is_complete() => {
                    println!(
                        "  {} {}: {} copied, {} already present",
                        "✓".green(),
                        partition.key,
                        outcome.copied,
                        outcome.skipped
                    );
                    if !outcome.collisions.is_empty() {
                        println!(
                            "    {} names taken by another corpus: {}",
                            outcome.collisions.len(),
                            outcome.collisions.join(", ").yellow()
                        );
                    }
                }
                Ok(outcome) => println!(
                    "  {} {}: {} copied, {} missing from source",
                    "!".yellow(),
                    partition.key,
                    outcome.copied,
                    outcome.missing.len()
                ),
                Err(e) => println!(
                    "  {} {}: {}",
                    "✗".red(),
                    partition.key,
                    format!("{}", e).red()
                ),
            }
        }
    }

    let failed = report.incomplete().count();
    if failed == 0 {
        println!(
            "{} {} partitions, {} samples copied",
            "Done".green(),
            report.partitions.len(),
            report.copied()
        );
        ExitCode::SUCCESS
    } else {
        eprintln!(
            "{}",
            format!("{} of {} partitions incomplete", failed, report.partitions.len()).red()
        );
        ExitCode::FAILURE
    }
}
