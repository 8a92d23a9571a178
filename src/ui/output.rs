use crate::ui::{Icons, theme};
use owo_colors::OwoColorize;

pub fn header(text: &str) {
    println!("{} {}", Icons::DATABASE, text.style(theme().header.clone()));
}

pub fn success(label: &str) {
    println!("{} {}", Icons::CHECK, label.style(theme().success.clone()));
}

pub fn error(label: &str) {
    eprintln!("{} {}", Icons::CROSS, label.style(theme().error.clone()));
}

pub fn warn(label: &str) {
    eprintln!("{} {}", Icons::WARN, label.style(theme().warn.clone()));
}

pub fn info(label: &str, value: &str) {
    println!(
        "{} {}: {}",
        Icons::INFO.style(theme().info.clone()),
        label.style(theme().dim.clone()),
        value
    );
}

pub fn section(title: &str) {
    println!();
    println!("━{}━", title.style(theme().header.clone()));
}

/// One integrity problem: its kind and the ids involved
pub fn problem(kind: &str, ids: &str) {
    println!("  {} {}: {}", Icons::MAG.style(theme().warn.clone()), kind.style(theme().warn.clone()), ids);
}

pub fn removed(count: usize) {
    println!("{} {}", Icons::DEL.style(theme().error.clone()), format!("{} rows removed", count).style(theme().dim.clone()));
}

pub fn created(path: &str) {
    println!("{} {}", Icons::NEW.style(theme().success.clone()), path);
}

pub fn repaired(label: &str) {
    println!("{} {}", Icons::WRENCH.style(theme().info.clone()), label.style(theme().success.clone()));
}

pub fn name(text: &str) -> String {
    text.style(theme().name.clone()).to_string()
}

pub fn muted(text: &str) -> String {
    text.style(theme().muted.clone()).to_string()
}
