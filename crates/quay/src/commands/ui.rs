//! Console output helpers for consistent CLI formatting.

use console::{style, StyledObject};

/// Print a success message with green checkmark.
pub fn success(msg: impl std::fmt::Display) {
    println!("{} {}", style("✓").green().bold(), msg);
}

/// Print an info/action message with blue arrow.
pub fn info(msg: impl std::fmt::Display) {
    println!("{} {}", style("→").blue().bold(), msg);
}

/// Print a warning message with yellow exclamation.
pub fn warn(msg: impl std::fmt::Display) {
    println!("{} {}", style("!").yellow().bold(), msg);
}

/// Style text as a package/target name (cyan).
pub fn pkg(name: impl std::fmt::Display) -> StyledObject<String> {
    style(name.to_string()).cyan()
}

/// Style text as a version or count (cyan).
pub fn num<T: std::fmt::Display>(n: T) -> StyledObject<String> {
    style(n.to_string()).cyan()
}

/// Print a section header.
pub fn header(title: impl std::fmt::Display) {
    println!("{}", style(title.to_string()).bold().underlined());
    println!();
}
