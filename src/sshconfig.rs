//! Loads and parses SSH-style host configuration files.
//!
//! The format is line oriented: `Host <name>` opens a block, following
//! `key value` lines are options on that block, `Include <glob>` splices
//! in other files, `#` starts a comment. Two extensions: a `#tag: <label>`
//! line inside a block is kept as an option under the reserved tag key,
//! and a literal `#tagorder` line sorts tagged hosts before untagged ones
//! for the rest of the parse.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Reserved option key holding a host's tag label.
pub const TAG_KEY: &str = "#tag:";

const TAG_ORDER_DIRECTIVE: &str = "#tagorder";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no ssh config found in ~/.ssh/config or /etc/ssh/ssh_config: are you sure ssh is installed?")]
    NotFound,
    #[error("unable to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("bad Include pattern `{pattern}`: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
}

/// One committed host block. Immutable once the block closes; a re-parse
/// builds a fresh collection instead of mutating published hosts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Host {
    pub name: String,
    options: Vec<(String, String)>,
}

impl Host {
    fn new(name: String) -> Self {
        Self {
            name,
            options: Vec::new(),
        }
    }

    /// Option value for `key` (case-insensitive), or `""` when absent.
    /// Absence is not distinguished from an empty value.
    pub fn option(&self, key: &str) -> &str {
        let key = key.to_lowercase();
        self.options
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
            .unwrap_or("")
    }

    pub fn has_option(&self, key: &str) -> bool {
        let key = key.to_lowercase();
        self.options.iter().any(|(k, _)| *k == key)
    }

    /// Options in original file order.
    pub fn options(&self) -> impl Iterator<Item = (&str, &str)> {
        self.options.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_sentinel(&self) -> bool {
        self.name.is_empty() && self.options.is_empty()
    }

    // `key` must already be lower-cased. A repeated key overwrites the
    // value in place, keeping its original position.
    fn set(&mut self, key: String, value: String) {
        match self.options.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.options.push((key, value)),
        }
    }
}

/// Result of one top-level parse: hosts in primary order, the file that
/// was opened, and every path that must be watched for changes.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub hosts: Vec<Host>,
    path: PathBuf,
    watch_set: BTreeSet<PathBuf>,
}

impl Config {
    /// Parses the file at `path`, following `Include` directives
    /// recursively.
    pub fn parse(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();
        let (hosts, watch_set) = parse_file(&path, false)?;
        Ok(Self {
            hosts,
            path,
            watch_set,
        })
    }

    /// Like [`Config::parse`], but resolves relative paths against the
    /// current working directory.
    pub fn parse_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.is_absolute() {
            Self::parse(path)
        } else {
            let cwd = std::env::current_dir().map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            Self::parse(cwd.join(path))
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn watch_set(&self) -> &BTreeSet<PathBuf> {
        &self.watch_set
    }

    /// First host named `name`, or a sentinel empty host. Callers check
    /// [`Host::is_sentinel`]; a miss is not an error here.
    pub fn host(&self, name: &str) -> Host {
        self.hosts
            .iter()
            .find(|h| h.name == name)
            .cloned()
            .unwrap_or_default()
    }

    pub fn option_for(&self, host: &str, key: &str) -> String {
        self.host(host).option(key).to_string()
    }
}

/// Default config location: the user file first, then the system one.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    if let Some(home) = dirs::home_dir() {
        let path = home.join(".ssh").join("config");
        if path.exists() {
            return Ok(path);
        }
    }
    let system = PathBuf::from("/etc/ssh/ssh_config");
    if system.exists() {
        return Ok(system);
    }
    Err(ConfigError::NotFound)
}

// One file's worth of parsing. Includes recurse here with their own
// accumulators so no option map is ever shared across files; the caller
// splices only the finished host list.
fn parse_file(
    path: &Path,
    inherited_tag_order: bool,
) -> Result<(Vec<Host>, BTreeSet<PathBuf>), ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let dir = path.parent().unwrap_or_else(|| Path::new("."));

    let mut tag_order = inherited_tag_order;
    let mut primary: Vec<Host> = Vec::new();
    let mut secondary: Vec<Host> = Vec::new();
    let mut watch_set = BTreeSet::from([path.to_path_buf()]);
    let mut open: Option<Host> = None;

    for raw in text.lines() {
        let line = raw.trim();

        if line == TAG_ORDER_DIRECTIVE {
            tag_order = true;
            continue;
        }
        let is_tag_line = line.starts_with(TAG_KEY);
        if line.is_empty() || (line.starts_with('#') && !is_tag_line) {
            continue;
        }

        let mut tokens = line.split_whitespace();
        let first = match tokens.next() {
            Some(t) => t,
            None => continue,
        };
        let rest: Vec<&str> = tokens.collect();
        // malformed line, skip
        if rest.is_empty() {
            continue;
        }
        let mut key = first.to_lowercase();
        let mut value = rest.join(" ");
        // strip trailing comments, except on tag lines where the marker
        // is part of the key and the label stays verbatim
        if !is_tag_line {
            key = strip_comment(&key);
            value = strip_comment(&value);
        }

        if key == "include" {
            // close the open block first so included hosts really land
            // at the point of inclusion, not ahead of it
            if let Some(host) = open.take() {
                commit(host, tag_order, &mut primary, &mut secondary);
            }
            let pattern = if Path::new(&value).is_absolute() {
                PathBuf::from(&value)
            } else {
                dir.join(&value)
            };
            let pattern = pattern.to_string_lossy().into_owned();
            let matches = glob::glob(&pattern).map_err(|source| ConfigError::Pattern {
                pattern: pattern.clone(),
                source,
            })?;
            for entry in matches.flatten() {
                // independent sub-parse, inheriting tag-ordering mode;
                // its hosts land at the point of inclusion
                let (hosts, watched) = parse_file(&entry, tag_order)?;
                primary.extend(hosts);
                watch_set.extend(watched);
            }
            continue;
        }

        if key == "host" {
            if let Some(host) = open.take() {
                commit(host, tag_order, &mut primary, &mut secondary);
            }
            // pattern-matched catch-all blocks are dropped wholly,
            // options included: `open` stays None until the next Host
            if !value.contains('*') {
                open = Some(Host::new(value));
            }
            continue;
        }

        if let Some(host) = open.as_mut() {
            host.set(key, value);
        }
    }
    if let Some(host) = open.take() {
        commit(host, tag_order, &mut primary, &mut secondary);
    }

    primary.append(&mut secondary);
    Ok((primary, watch_set))
}

// Commit rule: with tag ordering active, tagged blocks keep primary
// position and untagged ones trail after every tagged host.
fn commit(host: Host, tag_order: bool, primary: &mut Vec<Host>, secondary: &mut Vec<Host>) {
    if tag_order && !host.has_option(TAG_KEY) {
        secondary.push(host);
    } else {
        primary.push(host);
    }
}

fn strip_comment(input: &str) -> String {
    match input.find('#') {
        Some(i) => input[..i].trim().to_string(),
        None => input.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    fn names(config: &Config) -> Vec<&str> {
        config.hosts.iter().map(|h| h.name.as_str()).collect()
    }

    #[test]
    fn hosts_keep_file_order() {
        let dir = tempdir().unwrap();
        let path = write(
            dir.path(),
            "config",
            "Host alpha\n  HostName 10.0.0.1\nHost beta\n  HostName 10.0.0.2\nHost gamma\n  HostName 10.0.0.3\n",
        );
        let config = Config::parse(&path).unwrap();
        assert_eq!(names(&config), ["alpha", "beta", "gamma"]);
    }

    #[test]
    fn tag_order_groups_tagged_hosts_first() {
        let dir = tempdir().unwrap();
        let path = write(
            dir.path(),
            "config",
            "#tagorder\nHost a\n  HostName 1\nHost b\n  #tag: prod\n  HostName 2\nHost c\n  #tag: prod\n  HostName 3\nHost d\n  HostName 4\n",
        );
        let config = Config::parse(&path).unwrap();
        assert_eq!(names(&config), ["b", "c", "a", "d"]);
    }

    #[test]
    fn wildcard_blocks_are_dropped_with_their_options() {
        let dir = tempdir().unwrap();
        let path = write(
            dir.path(),
            "config",
            "Host one\n  HostName 10.0.0.1\nHost *\n  ForwardAgent yes\nHost two\n  HostName 10.0.0.2\n",
        );
        let config = Config::parse(&path).unwrap();
        assert_eq!(names(&config), ["one", "two"]);
        // the catch-all's options must not leak into a neighbouring block
        assert_eq!(config.option_for("one", "ForwardAgent"), "");
        assert_eq!(config.option_for("two", "ForwardAgent"), "");
    }

    #[test]
    fn include_resolves_relative_to_including_file() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("extra")).unwrap();
        write(
            dir.path(),
            "extra/one.conf",
            "Host included-a\n  HostName 10.1.0.1\n",
        );
        write(
            dir.path(),
            "extra/two.conf",
            "Host included-b\n  HostName 10.1.0.2\n",
        );
        let path = write(
            dir.path(),
            "config",
            "Host top\n  HostName 10.0.0.1\nInclude ./extra/*.conf\nHost tail\n  HostName 10.0.0.9\n",
        );
        let config = Config::parse(&path).unwrap();
        assert_eq!(names(&config), ["top", "included-a", "included-b", "tail"]);
        assert!(config.watch_set().contains(&path));
        assert!(config
            .watch_set()
            .contains(&dir.path().join("extra/one.conf")));
        assert!(config
            .watch_set()
            .contains(&dir.path().join("extra/two.conf")));
    }

    #[test]
    fn second_relative_include_still_resolves_against_file_dir() {
        let dir = tempdir().unwrap();
        write(dir.path(), "a.conf", "Host from-a\n  HostName 1\n");
        write(dir.path(), "b.conf", "Host from-b\n  HostName 2\n");
        let path = write(dir.path(), "config", "Include a.conf\nInclude b.conf\n");
        let config = Config::parse(&path).unwrap();
        assert_eq!(names(&config), ["from-a", "from-b"]);
    }

    #[test]
    fn includes_inherit_tag_ordering() {
        let dir = tempdir().unwrap();
        write(
            dir.path(),
            "sub.conf",
            "Host plain\n  HostName 1\nHost tagged\n  #tag: db\n  HostName 2\n",
        );
        let path = write(dir.path(), "config", "#tagorder\nInclude sub.conf\n");
        let config = Config::parse(&path).unwrap();
        assert_eq!(names(&config), ["tagged", "plain"]);
    }

    #[test]
    fn reparse_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = write(
            dir.path(),
            "config",
            "#tagorder\nHost a\n  HostName 1\nHost b\n  #tag: x\n  Port 2222\n",
        );
        let first = Config::parse(&path).unwrap();
        let second = Config::parse(&path).unwrap();
        assert_eq!(first.hosts, second.hosts);
    }

    #[test]
    fn single_token_lines_are_skipped() {
        let dir = tempdir().unwrap();
        let path = write(
            dir.path(),
            "config",
            "Host a\n  Compression\n  HostName 10.0.0.1\n",
        );
        let config = Config::parse(&path).unwrap();
        assert_eq!(names(&config), ["a"]);
        assert_eq!(config.option_for("a", "hostname"), "10.0.0.1");
        assert_eq!(config.option_for("a", "compression"), "");
    }

    #[test]
    fn trailing_comments_are_stripped_but_tag_lines_kept_verbatim() {
        let dir = tempdir().unwrap();
        let path = write(
            dir.path(),
            "config",
            "Host a\n  HostName example.com # prod box\n  #tag: prod\n",
        );
        let config = Config::parse(&path).unwrap();
        assert_eq!(config.option_for("a", "HostName"), "example.com");
        assert_eq!(config.option_for("a", TAG_KEY), "prod");
    }

    #[test]
    fn option_keys_are_case_folded_and_overwrite_in_place() {
        let dir = tempdir().unwrap();
        let path = write(
            dir.path(),
            "config",
            "Host a\n  HostName first\n  User ops\n  hostname second\n",
        );
        let config = Config::parse(&path).unwrap();
        let host = config.host("a");
        assert_eq!(host.option("HOSTNAME"), "second");
        // overwrite keeps the key's original position
        let keys: Vec<&str> = host.options().map(|(k, _)| k).collect();
        assert_eq!(keys, ["hostname", "user"]);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempdir().unwrap();
        let err = Config::parse(dir.path().join("nonexistent")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn lookups_return_sentinels_on_miss() {
        let dir = tempdir().unwrap();
        let path = write(dir.path(), "config", "Host a\n  HostName 1\n");
        let config = Config::parse(&path).unwrap();
        assert!(config.host("nope").is_sentinel());
        assert_eq!(config.option_for("a", "user"), "");
    }

    #[test]
    fn tag_order_applies_from_directive_onward() {
        let dir = tempdir().unwrap();
        // `early` commits before the directive line and keeps its slot
        let path = write(
            dir.path(),
            "config",
            "Host early\n  HostName 1\nHost mid\n  HostName 2\n#tagorder\nHost tagged\n  #tag: x\n  HostName 3\nHost late\n  HostName 4\n",
        );
        let config = Config::parse(&path).unwrap();
        assert_eq!(names(&config), ["early", "tagged", "mid", "late"]);
    }
}
