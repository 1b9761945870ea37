use comfy_table::Cell;

use skep_core::commands;
use skep_core::vault::Vault;

use crate::format::{format_bytes, format_mtime};
use crate::table::CliTableTheme;

pub(crate) fn run_list(vault: &Vault) {
    let stats = commands::list::run(vault);
    if stats.files.is_empty() {
        println!("No files stored.");
        return;
    }

    let theme = CliTableTheme::detect();
    let mut table = theme.new_data_table(&["Name", "Size", "Shards", "Modified", "SHA-1"]);

    for entry in &stats.files {
        table.add_row(vec![
            Cell::new(entry.file_name.clone()),
            Cell::new(format_bytes(entry.file_length.max(0) as u64)),
            Cell::new(entry.shard_count),
            Cell::new(format_mtime(entry.last_modified)),
            Cell::new(entry.sha1.to_string()),
        ]);
    }
    println!("{table}");
    println!();
    println!(
        "{} files, {} total",
        stats.files.len(),
        format_bytes(stats.total_bytes.max(0) as u64),
    );
}
