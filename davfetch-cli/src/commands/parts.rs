//! Parts command - inspect a split download directory.

use std::path::PathBuf;

use davfetch::download::SplitLayout;

use super::load_config;
use crate::error::CliError;

/// Arguments for the parts command.
pub struct PartsArgs {
    pub config: Option<PathBuf>,
    pub dir: PathBuf,
    pub size: Option<u64>,
}

/// One line per part plus a completeness summary.
fn report(layout: &SplitLayout, size: Option<u64>) -> Vec<String> {
    let parts = layout.scan();
    let mut lines: Vec<String> = parts
        .iter()
        .map(|(index, len)| format!("  {}  {:>14} bytes", SplitLayout::part_name(*index), len))
        .collect();

    let on_disk: u64 = parts.iter().map(|(_, len)| len).sum();
    lines.push(format!("{} part(s), {} bytes on disk", parts.len(), on_disk));

    if let Some(total) = size.filter(|&s| s > 0) {
        let usable = layout.existing_size(total);
        let expected = layout.part_count(total);
        if usable >= total {
            lines.push(format!("Complete: {} of {} parts", expected, expected));
        } else {
            lines.push(format!(
                "Incomplete: resume would start at byte {} of {} ({} of {} parts usable)",
                usable,
                total,
                layout.existing_part_count(total),
                expected
            ));
        }
    }
    lines
}

/// Run the parts command.
pub fn run(args: PartsArgs) -> Result<(), CliError> {
    let config = load_config(args.config.as_deref())?;

    if !args.dir.is_dir() {
        return Err(CliError::Setup(format!(
            "{} is not a split download directory",
            args.dir.display()
        )));
    }

    let layout = SplitLayout::new(&args.dir, config.transfer.split_part_size);
    println!("{}", args.dir.display());
    for line in report(&layout, args.size) {
        println!("{}", line);
    }
    Ok(())
}
