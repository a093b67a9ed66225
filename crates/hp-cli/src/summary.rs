use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};

use crate::commands::{CheckIssue, MatchReport, ProtocolRow};

pub fn print_match(report: &MatchReport) {
    println!("{}", ranking_table(report));
    if report.fallback {
        println!("No protocol matched; showing {}", report.selected_protocol);
    } else {
        println!("Selected: {}", report.selected_protocol);
    }
    println!("Stage {} of {}", report.stage_index + 1, report.stage_count);
    println!("{}", bindings_table(report));
}

pub fn ranking_table(report: &MatchReport) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("#"),
        header_cell("Protocol"),
        header_cell("Name"),
        header_cell("Score"),
        header_cell("Required"),
        header_cell("Status"),
    ]);
    apply_table_style(&mut table);
    align_column(&mut table, 3, CellAlignment::Right);
    align_column(&mut table, 4, CellAlignment::Right);
    for (rank, row) in report.ranking.iter().enumerate() {
        let status = if row.acceptable {
            Cell::new("match").fg(Color::Green)
        } else if row.missing_priors {
            Cell::new("missing priors").fg(Color::Yellow)
        } else {
            Cell::new("required failed").fg(Color::Red)
        };
        let id = if row.protocol_id == report.selected_protocol {
            Cell::new(&row.protocol_id).add_attribute(Attribute::Bold)
        } else {
            Cell::new(&row.protocol_id)
        };
        table.add_row(vec![
            Cell::new(rank + 1),
            id,
            Cell::new(&row.name),
            Cell::new(row.score),
            Cell::new(row.required_satisfied),
            status,
        ]);
    }
    table
}

pub fn bindings_table(report: &MatchReport) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Viewport"),
        header_cell("Study"),
        header_cell("Series"),
        header_cell("Instance"),
    ]);
    apply_table_style(&mut table);
    align_column(&mut table, 0, CellAlignment::Right);
    for binding in &report.bindings {
        table.add_row(vec![
            Cell::new(binding.viewport_index),
            id_cell(binding.study_id.as_deref()),
            id_cell(binding.series_id.as_deref()),
            id_cell(binding.instance_id.as_deref()),
        ]);
    }
    table
}

pub fn print_protocols(rows: &[ProtocolRow]) {
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Id"),
        header_cell("Name"),
        header_cell("Locked"),
        header_cell("Stages"),
        header_cell("Priors"),
    ]);
    apply_table_style(&mut table);
    align_column(&mut table, 2, CellAlignment::Center);
    align_column(&mut table, 3, CellAlignment::Right);
    align_column(&mut table, 4, CellAlignment::Right);
    for row in rows {
        table.add_row(vec![
            Cell::new(&row.id),
            Cell::new(&row.name),
            Cell::new(if row.locked { "yes" } else { "no" }),
            Cell::new(row.stages),
            Cell::new(row.priors_referenced),
        ]);
    }
    println!("{table}");
}

pub fn print_issues(issues: &[CheckIssue]) {
    if issues.is_empty() {
        println!("No issues found");
        return;
    }
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Protocol"),
        header_cell("Location"),
        header_cell("Issue"),
    ]);
    apply_table_style(&mut table);
    for issue in issues {
        table.add_row(vec![
            Cell::new(&issue.protocol_id),
            dim_cell(&issue.location),
            Cell::new(&issue.message).fg(Color::Red),
        ]);
    }
    println!("{table}");
    println!("{} issue(s)", issues.len());
}

pub fn apply_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120);
}

fn align_column(table: &mut Table, index: usize, alignment: CellAlignment) {
    if let Some(column) = table.column_mut(index) {
        column.set_cell_alignment(alignment);
    }
}

fn header_cell(label: &str) -> Cell {
    Cell::new(label)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

fn id_cell(id: Option<&str>) -> Cell {
    match id {
        Some(id) => Cell::new(id),
        None => dim_cell("-"),
    }
}

fn dim_cell<T: ToString>(value: T) -> Cell {
    Cell::new(value).fg(Color::DarkGrey)
}
