// src/commands/list.rs

use colored::*;

use crate::core::matrix::{registry_groups, ALL_ALIAS_GROUPS};
use crate::t;

/// Prints the config-group registry in declaration order.
pub fn execute(locale: &str) {
    println!("{}", t!("list.banner", locale = locale).bold());

    for group in registry_groups() {
        println!("\n{}", group.name().cyan().bold());
        for config in group.configs() {
            println!("  - {:<44} {}", config.label().green(), config.description());
            let bindings: Vec<String> = config
                .bindings()
                .iter()
                .map(|(key, value)| format!("{key}={value}"))
                .collect();
            println!("      {}", bindings.join(" ").dimmed());
            if !config.command_prefix().is_empty() {
                println!(
                    "      {}",
                    t!("list.prefix", locale = locale, prefix = config.command_prefix()).dimmed()
                );
            }
        }
    }

    println!(
        "\n{}",
        t!("list.all_alias", locale = locale, groups = ALL_ALIAS_GROUPS.join(", ")).yellow()
    );
}
