pub mod icons;
pub mod output;
pub mod table;
pub mod theme;

pub use icons::Icons;
pub use output::{
    created, error, header, info, muted, name, problem, removed, repaired, section, success, warn,
};
pub use table::{TableBuilder, VariableRow, stats_table, variables_table};
pub use theme::{Theme, theme};
