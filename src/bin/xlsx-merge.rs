use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand, ValueEnum};

use xlsx_merge_export::catalog::discover_workbook_files;
use xlsx_merge_export::model::normalize_path;
use xlsx_merge_export::{ExportGrouping, MergeMode, MergeOrchestrator, MergeRequest, RequestStatus};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Mode {
    /// Every sheet copied with its layout.
    Structural,
    /// Values of all sheets in one sheet.
    Concat,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Grouping {
    Merged,
    PerSheet,
    PerSourceFile,
}

#[derive(Parser)]
#[command(about = "Merge sheets of Excel workbooks into one workbook and export them to PDF.")]
struct Args {
    /// Log debug messages.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the sheets of workbooks; directories are searched recursively.
    List {
        paths: Vec<PathBuf>,
    },
    /// Merge sheets, then save and/or export the result.
    Merge {
        /// `<file>::<sheet>`, in merge order (repeatable).
        #[arg(long = "sheet")]
        sheets: Vec<String>,

        /// Every sheet of these workbooks or directories, after the `--sheet` ones (repeatable).
        #[arg(long = "all")]
        all: Vec<PathBuf>,

        #[arg(long, value_enum, default_value_t = Mode::Structural)]
        mode: Mode,

        #[arg(long, value_enum, default_value_t = Grouping::Merged)]
        grouping: Grouping,

        /// Directory the PDF documents are written to; no export without it.
        #[arg(long)]
        pdf_dir: Option<PathBuf>,

        /// Save the merged workbook here (.xlsx).
        #[arg(long)]
        save: Option<PathBuf>,

        /// `<file>::<sheet>` whose first row is data, not a header (concat mode, repeatable).
        #[arg(long = "no-header")]
        no_header: Vec<String>,
    },
}

fn parse_sheet_arg(arg: &str) -> Result<(PathBuf, String)> {
    match arg.rsplit_once("::") {
        Some((file, sheet)) if !file.is_empty() && !sheet.is_empty() => Ok((normalize_path(file.as_ref()), sheet.to_string())),
        _ => Err(anyhow!("expected <file>::<sheet>, got {:?}", arg)),
    }
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();
    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let mut orchestrator = MergeOrchestrator::new();
    match args.command {
        Command::List { paths } => {
            let files = discover_workbook_files(&paths);
            let listing = orchestrator.list_sheets(&files);
            for entry in listing.entries() {
                println!("{}", entry.label());
            }
            for err in listing.errors() {
                eprintln!("{}", err);
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Merge { sheets, all, mode, grouping, pdf_dir, save, no_header } => {
            let mut references = sheets.iter().map(|s| parse_sheet_arg(s)).collect::<Result<Vec<_>>>()?;
            let listing = orchestrator.list_sheets(discover_workbook_files(&all));
            for err in listing.errors() {
                eprintln!("{}", err);
            }
            references.extend(listing.entries().into_iter().map(|e| (e.file, e.sheet_name)));

            let no_header = no_header.iter().map(|s| parse_sheet_arg(s)).collect::<Result<Vec<_>>>()?;
            let mode = match mode {
                Mode::Structural => MergeMode::Structural,
                Mode::Concat => MergeMode::Concat,
            };
            let grouping = match grouping {
                Grouping::Merged => ExportGrouping::OneMerged,
                Grouping::PerSheet => ExportGrouping::PerSheet,
                Grouping::PerSourceFile => ExportGrouping::PerSourceFile,
            };

            let headerless: Vec<usize> = references
                .iter()
                .enumerate()
                .filter(|(_, r)| no_header.contains(r))
                .map(|(order, _)| order)
                .collect();
            let mut request = MergeRequest::new(references, mode)?.with_grouping(grouping);
            for order in headerless {
                request = request.with_header(order, false);
            }
            if let Some(dir) = pdf_dir {
                request = request.with_output_dir(dir);
            }
            if let Some(path) = save {
                request = request.with_workbook_save_path(path);
            }

            let summary = orchestrator.run(&request)?;
            println!("{}", summary);
            for skipped in summary.build.skipped.iter() {
                eprintln!("skipped {}: {}", skipped.reference, skipped.error);
            }
            if let Some(export) = &summary.export {
                for doc in export.documents() {
                    println!("{}", doc.display());
                }
                for err in export.errors() {
                    eprintln!("{}", err);
                }
            }
            match summary.status() {
                RequestStatus::Failed => Ok(ExitCode::FAILURE),
                _ => Ok(ExitCode::SUCCESS),
            }
        }
    }
}
