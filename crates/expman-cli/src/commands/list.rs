use std::error::Error;
use std::path::Path;

use clap::Args;
use expman_registry::{column_names, list_experiments, parse_filter, ExperimentRow, Settings};
use serde_json::Value;

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Equality filter on a listed column, e.g. optimizer.lr=0.1. Repeatable.
    #[arg(long = "filter", value_name = "KEY=VALUE")]
    pub filters: Vec<String>,
    /// Print rows as a JSON array.
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: &ListArgs, root: &Path, settings: &Settings) -> Result<(), Box<dyn Error>> {
    let filters = args
        .filters
        .iter()
        .map(|raw| parse_filter(raw))
        .collect::<Result<Vec<_>, _>>()?;
    let rows = list_experiments(root, &settings.id_card_name, &filters)?;
    if args.json {
        let array: Vec<Value> = rows
            .iter()
            .map(|row| Value::Object(row.columns.clone()))
            .collect();
        println!("{}", serde_json::to_string_pretty(&array)?);
        return Ok(());
    }
    if rows.is_empty() {
        println!("No experiments found.");
        return Ok(());
    }
    print!("{}", render_table(&rows));
    Ok(())
}

/// Left-aligned columns separated by two spaces.
fn render_table(rows: &[ExperimentRow]) -> String {
    let columns = column_names(rows);
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| columns.iter().map(|column| row.cell(column)).collect())
        .collect();
    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(idx, column)| {
            cells
                .iter()
                .map(|line| line[idx].chars().count())
                .chain(std::iter::once(column.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();
    let mut out = String::new();
    push_line(&mut out, columns.iter().map(String::as_str), &widths);
    for line in &cells {
        push_line(&mut out, line.iter().map(String::as_str), &widths);
    }
    out
}

fn push_line<'a>(out: &mut String, cells: impl Iterator<Item = &'a str>, widths: &[usize]) {
    let mut line = String::new();
    for (idx, (cell, width)) in cells.zip(widths).enumerate() {
        if idx > 0 {
            line.push_str("  ");
        }
        line.push_str(cell);
        line.extend(std::iter::repeat(' ').take(width.saturating_sub(cell.chars().count())));
    }
    out.push_str(line.trim_end());
    out.push('\n');
}
