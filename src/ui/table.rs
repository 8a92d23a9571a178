use tabled::{Table, Tabled, settings::Style};

use crate::storage::DbStats;
use crate::ui::Icons;

#[derive(Tabled)]
pub struct TableRow {
    #[tabled(rename = "Metric")]
    pub metric: String,
    #[tabled(rename = "Value")]
    pub value: String,
}

/// One row of `relstore list`
#[derive(Tabled)]
pub struct VariableRow {
    #[tabled(rename = "Name")]
    pub name: String,
    #[tabled(rename = "Type")]
    pub tag: String,
    #[tabled(rename = "Id")]
    pub id: i64,
    #[tabled(rename = "Refs")]
    pub refs: usize,
}

#[derive(Default)]
pub struct TableBuilder {
    rows: Vec<TableRow>,
}

impl TableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_row(&mut self, label: &str, value: &str) {
        self.rows.push(TableRow {
            metric: label.to_string(),
            value: value.to_string(),
        });
    }

    pub fn build(&self) -> String {
        if self.rows.is_empty() {
            return String::new();
        }
        Table::new(&self.rows).with(Style::rounded()).to_string()
    }
}

pub fn stats_table(stats: &DbStats) -> String {
    let mut builder = TableBuilder::new();
    builder.add_row(&format!("{} Variables", Icons::STATS), &stats.variables.to_string());
    builder.add_row("Objects", &stats.objects.to_string());
    builder.add_row("Items", &stats.items.to_string());
    builder.build()
}

pub fn variables_table(rows: &[VariableRow]) -> String {
    if rows.is_empty() {
        return String::new();
    }
    Table::new(rows).with(Style::rounded()).to_string()
}
