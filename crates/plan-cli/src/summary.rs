use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};

use plan_cli::driver::RunOutcome;

pub fn print_summary(outcome: &RunOutcome) {
    let report = &outcome.report;
    let counts = report.counts();
    println!("Source: {}", outcome.source.display());
    println!("Destination: {}", outcome.destination.display());
    match &outcome.saved_to {
        Some(path) => println!("Saved: {}", path.display()),
        None => println!("Saved: - (dry run)"),
    }

    let mut table = Table::new();
    table.set_header(vec![header_cell("Strategy"), header_cell(report.strategy.as_str())]);
    apply_table_style(&mut table);
    align_column(&mut table, 1, CellAlignment::Right);
    table.add_row(vec![Cell::new("Rows processed"), Cell::new(counts.total())]);
    table.add_row(vec![Cell::new("Copied"), count_cell(counts.copied, Color::Green)]);
    table.add_row(vec![Cell::new("Skipped"), count_cell(counts.skipped, Color::DarkGrey)]);
    table.add_row(vec![Cell::new("No match"), count_cell(counts.no_match, Color::Yellow)]);
    table.add_row(vec![
        Cell::new("Duplicate source keys"),
        count_cell(report.duplicate_keys.len(), Color::Yellow),
    ]);
    println!("{table}");

    if !report.duplicate_keys.is_empty() {
        eprintln!("Duplicate keys in source (first occurrence used):");
        for key in &report.duplicate_keys {
            eprintln!("- {key}");
        }
    }
    println!("Elapsed time {}", outcome.elapsed.as_secs_f64());
}

fn apply_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(80);
}

fn align_column(table: &mut Table, index: usize, alignment: CellAlignment) {
    if let Some(column) = table.column_mut(index) {
        column.set_cell_alignment(alignment);
    }
}

fn count_cell(count: usize, color: Color) -> Cell {
    if count > 0 {
        Cell::new(count).fg(color).add_attribute(Attribute::Bold)
    } else {
        dim_cell(count)
    }
}

fn header_cell(label: &str) -> Cell {
    Cell::new(label)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

fn dim_cell<T: ToString>(value: T) -> Cell {
    Cell::new(value).fg(Color::DarkGrey)
}
