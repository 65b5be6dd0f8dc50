mod cli;
mod error;
mod services;
mod types;

use anyhow::Context;
use clap::Parser;
use cli::{AnalyzeArgs, Cli, Commands, InterpretArgs, SegmentArgs};
use error::{Result, SegmenterError};
use services::{HeaderSplitter, Segmenter, SourceReader, TableInterpreter};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, Level};
use tracing_subscriber;
use types::{ApiConfig, InterpretationResult, Section, SectionBody, SegmentConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    let result = match &cli.command {
        Commands::Segment(args) => handle_segment_command(args, &cli.output).await,
        Commands::Interpret(args) => handle_interpret_command(args, &cli.output).await,
        Commands::Analyze(args) => handle_analyze_command(args).await,
    };

    if let Err(e) = result {
        error!("Operation failed: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

async fn handle_segment_command(args: &SegmentArgs, output_dir: &PathBuf) -> Result<()> {
    let sources = SourceReader::resolve_sources(&args.sources)?;
    info!("Segmenting {} sources", sources.len());

    ensure_output_dir(output_dir).await?;

    let segmenter = Segmenter::new();
    let splitter = HeaderSplitter::new();
    let config = SegmentConfig {
        seed_page: args.seed_page,
        max_chunk_len: args.max_chunk_len,
    };

    for (idx, source) in sources.iter().enumerate() {
        info!("Processing source {}/{}: {}", idx + 1, sources.len(), source);

        let (content, metadata) = SourceReader::read(source).await?;
        let document = segmenter.segment(&content, &config);
        let sections = splitter.split(&document.prose, &config);

        let stem = source_stem(&metadata.filename);
        let tables_path = output_dir.join(format!("{}_tables.json", stem));
        let sections_path = output_dir.join(format!("{}_sections.json", stem));

        write_json(&tables_path, &document.tables).await?;
        write_json(&sections_path, &sections).await?;

        info!(
            "'{}': {} tables, {} level-1 sections, {} chunks",
            metadata.filename,
            document.tables.len(),
            sections.len(),
            count_chunks(&sections)
        );
        info!("  - {}", tables_path.display());
        info!("  - {}", sections_path.display());
    }

    info!("Segmentation completed successfully!");
    Ok(())
}

async fn handle_interpret_command(args: &InterpretArgs, output_dir: &PathBuf) -> Result<()> {
    let api_key = args
        .api_key
        .clone()
        .or_else(|| std::env::var("OPENAI_API_KEY").ok())
        .ok_or(SegmenterError::MissingApiKey)?;

    let api_config = ApiConfig {
        api_key,
        base_url: args.base_url.clone(),
        model: args.model.clone(),
        timeout: Duration::from_secs(args.timeout),
    };

    let sources = SourceReader::resolve_sources(&args.sources)?;
    info!("Interpreting tables from {} sources", sources.len());

    ensure_output_dir(output_dir).await?;

    let segmenter = Segmenter::new();
    let interpreter = TableInterpreter::new(api_config)?;
    let config = SegmentConfig::default();

    for source in &sources {
        let (content, metadata) = SourceReader::read(source).await?;
        let document = segmenter.segment(&content, &config);

        info!(
            "'{}': dispatching {} tables to the interpreter",
            metadata.filename,
            document.tables.len()
        );

        let interpretations = interpreter.interpret_tables(&document).await;
        let stem = source_stem(&metadata.filename);

        let mut structured = 0;
        let mut raw = 0;
        let mut failed = 0;
        for (n, interpretation) in interpretations.iter().enumerate() {
            match &interpretation.result {
                InterpretationResult::Structured(_) => structured += 1,
                InterpretationResult::Raw(_) => raw += 1,
                InterpretationResult::Failed(_) => failed += 1,
            }
            let artifact = output_dir.join(format!("{}_table_{}.json", stem, n));
            write_json(&artifact, interpretation).await?;
            info!("  - {}", artifact.display());
        }

        info!(
            "'{}': {} structured, {} raw, {} failed",
            metadata.filename, structured, raw, failed
        );
    }

    info!("Interpretation completed successfully!");
    Ok(())
}

async fn handle_analyze_command(args: &AnalyzeArgs) -> Result<()> {
    let sources = SourceReader::resolve_sources(&args.sources)?;
    info!("Analyzing {} sources", sources.len());

    let segmenter = Segmenter::new();
    let splitter = HeaderSplitter::new();
    let config = SegmentConfig::default();
    let mut all_analyses = HashMap::new();

    for source in sources {
        let (content, metadata) = SourceReader::read(&source).await?;
        let document = segmenter.segment(&content, &config);
        let sections = splitter.split(&document.prose, &config);

        println!("\n=== Analysis for '{}' ===", metadata.filename);
        println!("Source type: {:?}", metadata.source_type);
        println!("Total lines: {}", metadata.total_lines);
        println!("Tables extracted: {}", document.tables.len());
        println!("Position index size: {}", document.positions.len());
        println!("Level-1 sections: {}", sections.len());
        println!("Leaf chunks: {}", count_chunks(&sections));

        if args.detailed {
            println!("\nTables:");
            for table in &document.tables {
                println!(
                    "  {}: page {}, {} lines",
                    table.label,
                    table.page_index,
                    table.lines.len()
                );
            }
            println!("\nSections:");
            for section in &sections {
                print_section(section, 1);
            }
        }

        all_analyses.insert(
            source.clone(),
            serde_json::json!({
                "metadata": metadata,
                "tables": document.tables,
                "sections": sections,
            }),
        );
    }

    if let Some(json_path) = &args.json_output {
        let json_content = serde_json::to_string_pretty(&all_analyses)
            .context("Failed to serialize analysis results")?;
        tokio::fs::write(json_path, json_content)
            .await
            .context("Failed to write JSON analysis file")?;
        info!("Analysis results written to: {}", json_path.display());
    }

    Ok(())
}

fn print_section(section: &Section, depth: usize) {
    let indent = "  ".repeat(depth);
    match &section.body {
        SectionBody::Sections(children) => {
            println!("{}{} (page {})", indent, section.key, section.page_index);
            for child in children {
                print_section(child, depth + 1);
            }
        }
        SectionBody::Chunks(chunks) => {
            println!(
                "{}{} (page {}, {} chunks)",
                indent,
                section.key,
                section.page_index,
                chunks.len()
            );
        }
    }
}

fn count_chunks(sections: &[Section]) -> usize {
    sections
        .iter()
        .map(|section| match &section.body {
            SectionBody::Sections(children) => count_chunks(children),
            SectionBody::Chunks(chunks) => chunks.len(),
        })
        .sum()
}

fn source_stem(filename: &str) -> String {
    Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("document")
        .to_string()
}

async fn ensure_output_dir(output_dir: &PathBuf) -> Result<()> {
    if !output_dir.exists() {
        tokio::fs::create_dir_all(output_dir).await.map_err(|e| {
            SegmenterError::OutputDirectory {
                reason: format!("Failed to create output directory: {}", e),
            }
        })?;
        info!("Created output directory: {}", output_dir.display());
    }
    Ok(())
}

async fn write_json<T: serde::Serialize>(path: &PathBuf, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(|e| {
        SegmenterError::OutputDirectory {
            reason: format!("Failed to serialize {}: {}", path.display(), e),
        }
    })?;
    tokio::fs::write(path, json)
        .await
        .map_err(|e| SegmenterError::OutputDirectory {
            reason: format!("Failed to write {}: {}", path.display(), e),
        })?;
    Ok(())
}
