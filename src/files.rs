// SPDX-License-Identifier: PMPL-1.0-or-later

//! Input files: discovery, line counts, wordlist samples and rule files.
//!
//! Paths are kept in the form the configuration gives them (usually
//! relative to the sweep root) because they end up in commands, ledger
//! records and table rows. Filesystem access goes through `root.join(..)`.

use anyhow::{anyhow, bail, Context, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::fs;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

const IGNORED_PREFIX: &str = ".MDBSCANcache";
const SAMPLE_DIR: &str = "random_selected";

pub fn display(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// `hc/pack/best.rule` -> `hc_pack_best`: the path's directories and stem
/// joined with `_`, so rule files sharing a stem in different folders stay
/// distinct.
fn flat_stem(path: &Path) -> String {
    let mut parts: Vec<String> = path
        .parent()
        .into_iter()
        .flat_map(Path::components)
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    parts.push(stem(path));
    parts.join("_")
}

/// Regular files directly inside `dir`, sorted by name.
fn files_in(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = entry.with_context(|| format!("listing {}", dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        if entry.file_name().to_string_lossy().starts_with(IGNORED_PREFIX) {
            continue;
        }
        files.push(PathBuf::from(entry.file_name()));
    }
    Ok(files)
}

/// Expands a configured input into files: the file itself, or every file in
/// the directory. A missing path or an empty directory is an error.
pub fn get_files(root: &Path, spec: &str) -> Result<Vec<PathBuf>> {
    if spec.is_empty() {
        return Ok(Vec::new());
    }
    let spec = Path::new(spec);
    let resolved = root.join(spec);
    if resolved.is_file() {
        return Ok(vec![spec.to_path_buf()]);
    }
    if resolved.is_dir() {
        let files: Vec<PathBuf> = files_in(&resolved)?
            .into_iter()
            .map(|name| spec.join(name))
            .collect();
        if files.is_empty() {
            bail!("directory '{}' is empty", spec.display());
        }
        return Ok(files);
    }
    bail!("input path '{}' does not exist", spec.display())
}

fn read_lines(path: &Path) -> Result<Vec<String>> {
    let file = fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut lines = Vec::new();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .with_context(|| format!("reading {}", path.display()))?;
        if read == 0 {
            break;
        }
        lines.push(String::from_utf8_lossy(&buf).into_owned());
    }
    Ok(lines)
}

/// Number of non-blank lines.
pub fn count_lines(path: &Path) -> Result<u64> {
    Ok(read_lines(path)?
        .iter()
        .filter(|line| !line.trim().is_empty())
        .count() as u64)
}

/// Trimmed passwords, skipping blank lines and `#` comments.
pub fn load_passwords(path: &Path) -> Result<Vec<String>> {
    Ok(read_lines(path)?
        .into_iter()
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect())
}

/// Random source for wordlist sampling. The seed is logged so a run can be
/// repeated by putting it into `input.seed`.
pub fn sampling_rng(seed: Option<u64>) -> Result<StdRng> {
    let seed = match seed {
        Some(seed) => seed,
        None => {
            let mut bytes = [0u8; 8];
            getrandom::getrandom(&mut bytes)
                .map_err(|e| anyhow!("reading OS entropy for sampling seed: {}", e))?;
            u64::from_le_bytes(bytes)
        }
    };
    info!("wordlist sampling seed: {}", seed);
    Ok(StdRng::seed_from_u64(seed))
}

/// One wordlist as fed to a program run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordlistVariant {
    pub path: PathBuf,
    /// Number of passwords (the full line count for the original file)
    pub size: u64,
}

/// Size variants of `wordlist`, largest first.
///
/// Size 0 is the wordlist itself. Every other size is a random subset of
/// the next larger selection, written to `random_selected/<stem>_<size>.txt`
/// beside the wordlist. A sample file that already exists is reused as is.
pub fn wordlist_variants(
    root: &Path,
    wordlist: &Path,
    sizes: &[u64],
    rng: &mut StdRng,
) -> Result<Vec<WordlistVariant>> {
    let resolved = root.join(wordlist);
    let full_size = count_lines(&resolved)?;
    if sizes.is_empty() {
        return Ok(vec![WordlistVariant {
            path: wordlist.to_path_buf(),
            size: full_size,
        }]);
    }

    let mut selection = load_passwords(&resolved)?;
    if selection.is_empty() {
        warn!("wordlist {} has no passwords, skipping", wordlist.display());
        return Ok(Vec::new());
    }

    let mut sizes = sizes.to_vec();
    sizes.sort_unstable_by(|a, b| b.cmp(a));
    sizes.dedup();

    let sample_dir = wordlist
        .parent()
        .map(|p| p.join(SAMPLE_DIR))
        .unwrap_or_else(|| PathBuf::from(SAMPLE_DIR));
    let base = stem(wordlist);

    let mut variants = Vec::new();
    for size in sizes {
        if size == 0 {
            variants.push(WordlistVariant {
                path: wordlist.to_path_buf(),
                size: full_size,
            });
            continue;
        }
        if full_size < size {
            warn!(
                "requested size {} exceeds {} lines in {}",
                size,
                full_size,
                wordlist.display()
            );
            continue;
        }
        // A smaller sample can only be drawn from what is left.
        let size_usize = usize::try_from(size)?;
        if selection.len() < size_usize {
            warn!(
                "requested size {} exceeds the {} usable passwords in {}",
                size,
                selection.len(),
                wordlist.display()
            );
            continue;
        }

        let sample_path = sample_dir.join(format!("{}_{}.txt", base, size));
        let sample_resolved = root.join(&sample_path);
        if sample_resolved.exists() {
            debug!("reusing sample {}", sample_path.display());
            selection = load_passwords(&sample_resolved)?;
        } else {
            selection = selection
                .choose_multiple(rng, size_usize)
                .cloned()
                .collect();
            write_lines(&sample_resolved, &selection)?;
            info!("generated file {}", sample_path.display());
        }
        variants.push(WordlistVariant {
            path: sample_path,
            size,
        });
    }
    Ok(variants)
}

fn write_lines(path: &Path, lines: &[String]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    writer.write_all(lines.join("\n").as_bytes())?;
    writer.flush()?;
    Ok(())
}

/// Rule file produced by `program`'s run number `index` on `wordlist`.
pub fn rules_file_name(template: &str, program: &str, wordlist: &Path, index: usize) -> String {
    template
        .replace("<program>", program)
        .replace("<wordlist>", &stem(wordlist))
        .replace("<argsN>", &index.to_string())
}

/// Pre-built rule files: everything one level down in `folder`'s
/// subdirectories, or the files in `folder` itself when it has none.
pub fn list_rule_files(root: &Path, folder: &str) -> Result<Vec<PathBuf>> {
    let folder = Path::new(folder);
    let resolved = root.join(folder);
    if !resolved.is_dir() {
        bail!("rule folder '{}' not found", folder.display());
    }

    let mut subdirs = Vec::new();
    for entry in WalkDir::new(&resolved)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = entry.with_context(|| format!("listing {}", resolved.display()))?;
        if entry.file_type().is_dir() {
            subdirs.push(PathBuf::from(entry.file_name()));
        }
    }

    if subdirs.is_empty() {
        return Ok(files_in(&resolved)?
            .into_iter()
            .map(|name| folder.join(name))
            .collect());
    }

    let mut rules = Vec::new();
    for sub in subdirs {
        for name in files_in(&resolved.join(&sub))? {
            rules.push(folder.join(&sub).join(name));
        }
    }
    Ok(rules)
}

/// Removes its file when dropped. A failed removal is logged, never raised.
#[derive(Debug)]
pub struct TempFile {
    path: PathBuf,
    arg: String,
}

impl TempFile {
    /// `path` is where the file lives; `arg` is how commands refer to it.
    pub fn new(path: PathBuf, arg: impl Into<String>) -> Self {
        Self {
            path,
            arg: arg.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn arg(&self) -> &str {
        &self.arg
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => info!("{} was deleted", self.arg),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => warn!("could not delete {}: {}", self.path.display(), err),
        }
    }
}

/// Copies the first `limit` lines of `rule_file` to
/// `<temp_dir>/<flattened rule path>_<limit>.txt`.
///
/// Returns `None` (after a warning) when the rule file has fewer than
/// `limit` lines. The copy's path is deterministic so commands that use it
/// fingerprint the same way on every sweep.
pub fn truncated_rule_file(
    root: &Path,
    rule_file: &Path,
    temp_dir: &Path,
    limit: u64,
) -> Result<Option<TempFile>> {
    let source = root.join(rule_file);
    let available = count_lines(&source)?;
    if available < limit {
        warn!(
            "the file '{}' has only {} lines, which is less than the limit of {}",
            rule_file.display(),
            available,
            limit
        );
        return Ok(None);
    }

    let arg_path = temp_dir.join(format!("{}_{}.txt", flat_stem(rule_file), limit));
    let target = root.join(&arg_path);
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    let guard = TempFile::new(target.clone(), display(&arg_path));

    let lines = read_lines(&source)?;
    let take = usize::try_from(limit)?;
    let file =
        fs::File::create(&target).with_context(|| format!("creating {}", target.display()))?;
    let mut writer = BufWriter::new(file);
    for line in lines.iter().take(take) {
        writer.write_all(line.as_bytes())?;
    }
    writer.flush()?;
    Ok(Some(guard))
}
