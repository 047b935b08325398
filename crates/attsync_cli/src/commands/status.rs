//! Status command implementation.

use super::facts;
use attsync_engine::Replica;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Replica status for a fact file.
#[derive(Debug, Serialize)]
pub struct StatusResult {
    /// Fact file path.
    pub path: String,
    /// Root digest, hex.
    pub root_hash: String,
    /// Number of facts.
    pub fact_count: usize,
    /// Number of non-empty groups.
    pub group_count: usize,
    /// Group encoding -> digest (if requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub groups: Option<BTreeMap<String, String>>,
}

/// Computes the status of a fact file.
pub fn inspect(path: &Path, show_groups: bool) -> Result<StatusResult, Box<dyn std::error::Error>> {
    let store = facts::load(path)?;
    let replica = Replica::open("local", store)?;
    let status = replica.status()?;

    Ok(StatusResult {
        path: path.display().to_string(),
        root_hash: status.root_hash.to_hex(),
        fact_count: status.fact_count,
        group_count: status.group_count,
        groups: show_groups.then(|| {
            status
                .groups
                .into_iter()
                .map(|(group, digest)| (group, digest.to_hex()))
                .collect()
        }),
    })
}

/// Runs the status command.
pub fn run(path: &Path, show_groups: bool, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let result = inspect(path, show_groups)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

fn print_text_output(result: &StatusResult) {
    println!("Fact file: {}", result.path);
    println!("  Root:   {}", result.root_hash);
    println!("  Facts:  {}", result.fact_count);
    println!("  Groups: {}", result.group_count);

    if let Some(groups) = &result.groups {
        println!();
        for (group, digest) in groups {
            println!("  {}  {}", &digest[..16], group);
        }
    }
}
