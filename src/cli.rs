//! Minimal CLI: declaration files → (grammar | docs), or check a response.
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use rayon::prelude::*;
use tracing::{debug, info};

use json_gbnf::{CompileOptions, Compiled, DeclFile, compile};

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// compile type declarations into a GBNF grammar and prompt documentation
#[derive(Parser, Debug)]
pub struct CommandLineInterface {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// compile declaration files and print or write grammar + documentation
    Grammar(GrammarOut),
    /// compile one declaration file and test a response text against its grammar
    Check(CheckResponse),
}

/// Command line overrides for the `options` block of a declaration file.
#[derive(Args, Debug, Clone)]
struct OptionOverrides {
    /// documentation heading for each model (default "Output Model")
    #[arg(long)]
    model_prefix: Option<String>,

    /// documentation heading for each model's fields (default "Output Fields")
    #[arg(long)]
    fields_prefix: Option<String>,

    /// wrap roots in an outer object; key holding the model name (e.g. "function")
    #[arg(long, requires = "outer_object_content")]
    outer_object_name: Option<String>,

    /// key holding the model object inside the outer wrapper (e.g. "function_parameters")
    #[arg(long, requires = "outer_object_name")]
    outer_object_content: Option<String>,

    /// leave field descriptions out of the documentation
    #[arg(long, default_value_t = false)]
    no_field_descriptions: bool,
}

#[derive(clap::Parser, Debug)]
struct GrammarOut {
    /// One or more declaration files. May be literal paths or quoted glob patterns
    #[arg(long, short, num_args = 1.., required = true)]
    input: Vec<String>,

    #[command(flatten)]
    overrides: OptionOverrides,

    /// write `<stem>.gbnf` and `<stem>.txt` here (stdout if omitted)
    #[arg(short, long)]
    out_dir: Option<PathBuf>,

    /// only the grammar
    #[arg(long, conflicts_with = "docs_only")]
    grammar_only: bool,

    /// only the documentation
    #[arg(long)]
    docs_only: bool,

    /// debugging
    #[arg(long)]
    no_op: bool,
}

#[derive(clap::Parser, Debug)]
struct CheckResponse {
    /// declaration file
    #[arg(long, short)]
    input: PathBuf,

    #[command(flatten)]
    overrides: OptionOverrides,

    /// response text to check, or '-' for stdin
    #[arg(long, short)]
    response: String,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl OptionOverrides {
    fn apply(&self, options: &mut CompileOptions) {
        if let Some(prefix) = &self.model_prefix {
            options.model_prefix = prefix.clone();
        }
        if let Some(prefix) = &self.fields_prefix {
            options.fields_prefix = prefix.clone();
        }
        if let (Some(name), Some(content)) = (&self.outer_object_name, &self.outer_object_content) {
            options.outer_object_name = Some(name.clone());
            options.outer_object_content = Some(content.clone());
        }
        if self.no_field_descriptions {
            options.field_descriptions = false;
        }
    }

    fn compile_file(&self, path: &Path) -> anyhow::Result<Compiled> {
        let source = std::fs::read(path)
            .with_context(|| format!("failed to read declaration file {}", path.display()))?;
        let decl = DeclFile::from_slice(&source)
            .with_context(|| format!("failed to parse declaration file {}", path.display()))?;
        let (graph, roots, mut options) = decl
            .into_graph()
            .with_context(|| format!("invalid declarations in {}", path.display()))?;
        self.apply(&mut options);
        debug!(path = %path.display(), ?options, "compiling");
        compile(&graph, &roots, &options)
            .with_context(|| format!("failed to compile {}", path.display()))
    }
}

impl CommandLineInterface {
    pub fn load() -> Self {
        Self::parse()
    }
    pub fn run(&self) -> anyhow::Result<()> {
        match &self.cmd {
            Command::Grammar(target) => {
                // debug path
                if target.no_op {
                    eprintln!("{self:#?}");
                    return Ok(())
                }

                // 1) resolve inputs
                let source_paths = resolve_file_path_patterns(&target.input)
                    .context("failed to resolve input file paths")?;

                // 2) compile every file on its own graph
                let results: Vec<anyhow::Result<Compiled>> = source_paths
                    .par_iter()
                    .map(|path| target.overrides.compile_file(path))
                    .collect();

                // 3) write or print, in input order
                let many = source_paths.len() > 1;
                for (path, result) in source_paths.iter().zip(results) {
                    let compiled = result?;
                    match target.out_dir.as_ref() {
                        Some(out_dir) => target.write_outputs(out_dir, path, &compiled)?,
                        None => target.print_outputs(path, &compiled, many),
                    }
                }
                info!(files = source_paths.len(), "done");
                Ok(())
            }
            Command::Check(target) => {
                let compiled = target.overrides.compile_file(&target.input)?;
                let response = if target.response == "-" {
                    let mut buffer = String::new();
                    std::io::stdin().read_to_string(&mut buffer).context("failed to read stdin")?;
                    buffer
                } else {
                    std::fs::read_to_string(&target.response)
                        .with_context(|| format!("failed to read response file {}", target.response))?
                };
                let response = response.trim_end_matches(['\r', '\n']);
                if !compiled.accepts(response)? {
                    bail!("response is not accepted by the grammar for {}", target.input.display());
                }
                eprintln!("{} {}", "✓".green(), "response accepted".green());
                Ok(())
            }
        }
    }
}

impl GrammarOut {
    fn write_outputs(&self, out_dir: &Path, source: &Path, compiled: &Compiled) -> anyhow::Result<()> {
        std::fs::create_dir_all(out_dir)
            .with_context(|| format!("failed to create {}", out_dir.display()))?;
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "grammar".to_string());
        let mut targets = Vec::new();
        if !self.docs_only {
            targets.push((out_dir.join(format!("{stem}.gbnf")), compiled.grammar()));
        }
        if !self.grammar_only {
            targets.push((out_dir.join(format!("{stem}.txt")), compiled.documentation()));
        }
        for (target, contents) in targets {
            std::fs::write(&target, contents)
                .with_context(|| format!("failed to write {}", target.display()))?;
            eprintln!("{} {}", "wrote".green(), target.display());
        }
        Ok(())
    }

    fn print_outputs(&self, source: &Path, compiled: &Compiled, many: bool) {
        if many {
            println!("# {}", source.display());
        }
        if !self.docs_only {
            print!("{}", compiled.grammar());
        }
        if !self.docs_only && !self.grammar_only {
            println!();
        }
        if !self.grammar_only {
            print!("{}", compiled.documentation());
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

fn resolve_file_path_patterns<I>(patterns: I) -> anyhow::Result<Vec<PathBuf>>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    fn has_glob_chars(s: &str) -> bool {
        // Minimal glob detection for the `glob` crate syntax.
        s.bytes().any(|b| matches!(b, b'*' | b'?' | b'[' | b'{' ))
    }

    let mut out = Vec::<PathBuf>::new();

    for raw in patterns {
        let pattern = raw.as_ref();

        if has_glob_chars(pattern) {
            let mut matched_any = false;
            for entry in glob::glob(pattern)? {
                out.push(entry?);
                matched_any = true;
            }
            if !matched_any {
                bail!("glob pattern matched no files: {pattern}");
            }
        } else {
            out.push(PathBuf::from(pattern));
        }
    }

    Ok(out)
}
