use anyhow::{Context, Result};
use clap::{Parser, error::ErrorKind};
use colored::*;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    env, fs,
    path::{Path, PathBuf},
    process::{self, Command, Stdio},
};

const ARGS_MESSAGE: &str = "You must pass a source and target directory - only";

#[derive(Debug, Deserialize)]
#[serde(default)]
struct PackerRules {
    marker: String,
    strip: String,
    extension: String,
    command: Vec<String>,
}

impl Default for PackerRules {
    fn default() -> Self {
        PackerRules {
            marker: "game".to_string(),
            strip: "_game".to_string(),
            extension: ".go".to_string(),
            command: vec!["go".to_string(), "build".to_string()],
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Metadata {
    game_names: Vec<String>,
    number_of_games: usize,
}

#[derive(Parser)]
#[command(author, version, about = "Copy game directories into a target tree, build their code and write a metadata manifest", long_about = None)]
struct Cli {
    /// Directory whose subdirectories are scanned for the marker substring
    source: PathBuf,

    /// Directory the matched games are copied into
    target: PathBuf,

    /// Verbose mode (show detailed information)
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, thiserror::Error)]
enum Error {
    #[error("Failed to load packer rules: {0}")]
    RulesFile(String),
    #[error("Packer rules must name a non-empty build command")]
    EmptyBuildCommand,
}

fn load_packer_rules() -> Result<PackerRules> {
    // Look next to the executable first, then in the current directory
    let exe_path = env::current_exe()?;
    let exe_dir = exe_path
        .parent()
        .ok_or_else(|| Error::RulesFile("Could not get executable directory".to_string()))?;

    let mut rules_path = exe_dir.join("packer_rules.json");
    if !rules_path.exists() {
        rules_path = env::current_dir()?.join("packer_rules.json");
    }
    if !rules_path.exists() {
        // No rules file installed anywhere: run with the built-in defaults
        return Ok(PackerRules::default());
    }

    let rules_content = fs::read_to_string(&rules_path)
        .with_context(|| format!("Failed to read packer rules from {}", rules_path.display()))?;

    let rules: PackerRules =
        serde_json::from_str(&rules_content).map_err(|e| Error::RulesFile(e.to_string()))?;

    if rules.command.is_empty() {
        return Err(Error::EmptyBuildCommand.into());
    }

    Ok(rules)
}

fn find_game_dirs(source: &Path, marker: &str) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(source)
        .with_context(|| format!("Failed to read source directory: {}", source.display()))?;

    // Immediate children only, in whatever order the filesystem lists them
    let mut game_paths = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if name.contains(marker) {
            game_paths.push(entry.path());
        }
    }

    Ok(game_paths)
}

fn normalized_name(path: &Path, strip: &str) -> String {
    let dir_name = path
        .file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_default();
    // Every occurrence is removed, not just a trailing match
    dir_name.replace(strip, "")
}

fn copy_and_overwrite(source: &Path, dest: &Path) -> Result<()> {
    if dest.is_dir() {
        fs::remove_dir_all(dest).with_context(|| {
            format!("Failed to remove existing destination: {}", dest.display())
        })?;
    } else if dest.exists() {
        fs::remove_file(dest).with_context(|| {
            format!("Failed to remove existing destination: {}", dest.display())
        })?;
    }

    copy_dir_recursive(source, dest)
}

fn copy_dir_recursive(source: &Path, dest: &Path) -> Result<()> {
    fs::create_dir_all(dest)
        .with_context(|| format!("Failed to create directory: {}", dest.display()))?;

    let entries = fs::read_dir(source)
        .with_context(|| format!("Failed to read directory: {}", source.display()))?;

    for entry in entries {
        let entry = entry?;
        let entry_dest = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&entry.path(), &entry_dest)?;
        } else {
            fs::copy(entry.path(), &entry_dest).with_context(|| {
                format!(
                    "Failed to copy {} to {}",
                    entry.path().display(),
                    entry_dest.display()
                )
            })?;
        }
    }

    Ok(())
}

fn find_code_file(dir: &Path, extension: &str) -> Result<Option<String>> {
    let mut entries = fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory: {}", dir.display()))?;

    // Root level only; stop at the first match without draining the listing
    let found = entries.find_map(|entry| {
        let entry = entry.ok()?;
        if !entry.file_type().ok()?.is_file() {
            return None;
        }
        let name = entry.file_name().to_str()?.to_string();
        name.ends_with(extension).then_some(name)
    });

    Ok(found)
}

fn compile_game(dest: &Path, rules: &PackerRules, verbose: bool) -> Result<()> {
    let Some(code_file_name) = find_code_file(dest, &rules.extension)? else {
        if verbose {
            println!(
                "No {} file in {}, nothing to build",
                rules.extension,
                dest.display()
            );
        }
        return Ok(());
    };

    if verbose {
        println!("Building {} in {}", code_file_name, dest.display());
    }

    // The working directory is passed to the child; ours is never touched
    let result = Command::new(&rules.command[0])
        .args(&rules.command[1..])
        .arg(&code_file_name)
        .current_dir(dest)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .output();

    // A broken build is reported, never fatal
    match result {
        Ok(output) => {
            let status_line = format!("compile result: {}", output.status);
            if output.status.success() {
                println!("{}", status_line.green());
            } else {
                println!("{}", status_line.yellow());
            }
            let stdout = String::from_utf8_lossy(&output.stdout);
            if !stdout.trim().is_empty() {
                println!("{}", stdout.trim_end());
            }
        }
        Err(e) => {
            println!(
                "{}",
                format!("Failed to run {}: {}", rules.command[0], e).red()
            );
        }
    }

    Ok(())
}

fn write_metadata(path: &Path, metadata: &Metadata) -> Result<()> {
    let json = serde_json::to_string(metadata)?;
    fs::write(path, json).with_context(|| format!("Failed to write manifest: {}", path.display()))
}

fn run(source: &Path, target: &Path, rules: &PackerRules, verbose: bool) -> Result<Metadata> {
    let game_paths = find_game_dirs(source, &rules.marker)?;
    if verbose {
        println!(
            "Found {} matching directories under {}",
            game_paths.len(),
            source.display()
        );
    }

    fs::create_dir_all(target)
        .with_context(|| format!("Failed to create target directory: {}", target.display()))?;

    let mut game_names = Vec::new();
    let mut seen = HashSet::new();
    for path in &game_paths {
        let name = normalized_name(path, &rules.strip);
        let dest = target.join(&name);

        if !seen.insert(name.clone()) {
            println!(
                "{}",
                format!(
                    "Warning: two source directories map to {}, overwriting the earlier copy",
                    dest.display()
                )
                .yellow()
            );
        }

        if verbose {
            println!("Copying {} to {}", path.display(), dest.display());
        }
        copy_and_overwrite(path, &dest)?;
        compile_game(&dest, rules, verbose)?;
        game_names.push(name);
    }

    let metadata = Metadata {
        number_of_games: game_names.len(),
        game_names,
    };
    write_metadata(&target.join("metadata.json"), &metadata)?;

    Ok(metadata)
}

fn main() -> Result<()> {
    let cli = Cli::try_parse().unwrap_or_else(|err| match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => err.exit(),
        _ => {
            eprintln!("{}", ARGS_MESSAGE.red());
            process::exit(2);
        }
    });

    let rules = load_packer_rules()?;

    // Both arguments are taken relative to where the tool was invoked
    let cwd = env::current_dir().context("Failed to resolve current directory")?;
    let source_path = cwd.join(&cli.source);
    let target_path = cwd.join(&cli.target);

    let metadata = run(&source_path, &target_path, &rules, cli.verbose)?;

    println!(
        "{}",
        format!(
            "Packed {} games into {}",
            metadata.number_of_games,
            target_path.display()
        )
        .green()
    );

    Ok(())
}
