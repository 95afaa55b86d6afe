//! ASCII-safe rewrite of model descriptors.
//!
//! Some native parsers reject non-ASCII bytes anywhere in a descriptor or its
//! referenced paths. The sanitizer writes an ASCII-only copy of the descriptor
//! into a cache directory, copying any asset whose name would not survive, and
//! keeps every motion group and expression entry intact.
//!
//! Freshness is decided purely from modification times: a cached descriptor is
//! reused when it is not older than any source it was built from, and within a
//! process a snapshot of those times lets repeat calls skip all file reads.

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use hashbrown::HashMap;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::catalog::{list_with_suffix, mtime, EXPRESSION_SUFFIX, MOTION_SUFFIX};
use crate::error::{AvatarError, AvatarResult};

/// Bump when the cache layout changes; old caches are then ignored.
pub const CACHE_SCHEMA_VERSION: u32 = 2;
pub const SANITIZED_DESCRIPTOR: &str = "model.model3.json";

/// Work counters, cumulative over the sanitizer's lifetime.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SanitizeStats {
    /// Full passes (descriptor parsed and outputs planned).
    pub passes: usize,
    pub descriptor_reads: usize,
    pub files_copied: usize,
    pub descriptors_written: usize,
    /// Calls answered from the in-process snapshot.
    pub snapshot_hits: usize,
}

#[derive(Clone, Debug)]
struct Snapshot {
    output: PathBuf,
    watched: Vec<(PathBuf, Option<SystemTime>)>,
    expected: Vec<PathBuf>,
}

impl Snapshot {
    fn is_fresh(&self) -> bool {
        self.watched.iter().all(|(p, t)| mtime(p) == *t) && self.expected.iter().all(|p| p.exists())
    }
}

#[derive(Debug)]
pub struct AssetSanitizer {
    cache_base: PathBuf,
    snapshots: HashMap<PathBuf, Snapshot>,
    stats: SanitizeStats,
}

impl AssetSanitizer {
    pub fn new(cache_base: impl Into<PathBuf>) -> Self {
        Self {
            cache_base: cache_base.into(),
            snapshots: HashMap::new(),
            stats: SanitizeStats::default(),
        }
    }

    pub fn cache_base(&self) -> &Path {
        &self.cache_base
    }

    pub fn stats(&self) -> SanitizeStats {
        self.stats
    }

    /// Return a descriptor path safe for the native parser. Falls back to
    /// `descriptor` itself on any error.
    pub fn sanitize(&mut self, descriptor: &Path) -> PathBuf {
        if let Some(snap) = self.snapshots.get(descriptor) {
            if snap.is_fresh() {
                self.stats.snapshot_hits += 1;
                return snap.output.clone();
            }
        }
        match self.run(descriptor) {
            Ok(out) => out,
            Err(err) => {
                warn!(descriptor = %descriptor.display(), error = %err, "model sanitizer failed; using original descriptor");
                self.snapshots.remove(descriptor);
                descriptor.to_path_buf()
            }
        }
    }

    /// Cache directory used for `descriptor`.
    pub fn cache_root_for(&self, descriptor: &Path) -> PathBuf {
        let abs = descriptor
            .canonicalize()
            .unwrap_or_else(|_| descriptor.to_path_buf());
        let dir_name = abs
            .parent()
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let dir_token = safe_ident(&stable_token(&dir_name, "dir"), "model");
        let digest = digest_hex(abs.to_string_lossy().as_bytes(), 12);
        self.cache_base.join(format!(
            "model_{dir_token}_{digest}_ascii_v{CACHE_SCHEMA_VERSION}"
        ))
    }

    fn run(&mut self, descriptor: &Path) -> AvatarResult<PathBuf> {
        if !descriptor.is_file() {
            return Err(AvatarError::DescriptorNotFound(descriptor.to_path_buf()));
        }
        self.stats.passes += 1;
        let src_desc = descriptor
            .canonicalize()
            .map_err(|e| AvatarError::io(descriptor, e))?;
        let model_dir = src_desc
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let exp_files = list_with_suffix(&model_dir, EXPRESSION_SUFFIX);
        let motion_files = list_with_suffix(&model_dir, MOTION_SUFFIX);

        let text = fs::read_to_string(&src_desc).map_err(|e| AvatarError::io(&src_desc, e))?;
        self.stats.descriptor_reads += 1;
        let base: Value = serde_json::from_str(&text).map_err(|e| AvatarError::Descriptor {
            path: src_desc.clone(),
            source: e,
        })?;
        let Value::Object(base) = base else {
            return Err(AvatarError::ModelLoad {
                path: src_desc,
                reason: "descriptor is not a JSON object".into(),
            });
        };
        let src_refs = match base.get("FileReferences") {
            Some(Value::Object(m)) => m.clone(),
            _ => Map::new(),
        };

        let must_copy_core = !src_desc.to_string_lossy().is_ascii();
        let needs_ascii = must_copy_core
            || exp_files.iter().chain(&motion_files).any(|p| !file_name(p).is_ascii())
            || !value_is_ascii(&Value::Object(src_refs.clone()));

        let mut watched = vec![
            (descriptor.to_path_buf(), mtime(descriptor)),
            (model_dir.clone(), mtime(&model_dir)),
        ];
        if !needs_ascii {
            watched.extend(exp_files.iter().chain(&motion_files).map(|p| (p.clone(), mtime(p))));
            self.snapshots.insert(
                descriptor.to_path_buf(),
                Snapshot {
                    output: descriptor.to_path_buf(),
                    watched,
                    expected: Vec::new(),
                },
            );
            return Ok(descriptor.to_path_buf());
        }

        let cache_root = self.cache_root_for(descriptor);
        fs::create_dir_all(&cache_root).map_err(|e| AvatarError::io(&cache_root, e))?;
        let cache_root = cache_root
            .canonicalize()
            .map_err(|e| AvatarError::io(&cache_root, e))?;

        let mut plan = Plan::new(&model_dir, &cache_root, must_copy_core);
        plan.note_src(&src_desc);
        let new_refs = plan.rewrite_refs(&src_refs, &exp_files, &motion_files);

        let mut sanitized = base.clone();
        let version = base.get("Version").and_then(Value::as_i64).filter(|v| *v != 0).unwrap_or(3);
        sanitized.insert("Version".into(), Value::from(version));
        sanitized.insert("FileReferences".into(), Value::Object(new_refs));
        let sanitized = ascii_only(Value::Object(sanitized));

        let out_path = cache_root.join(SANITIZED_DESCRIPTOR);
        let cache_fresh = mtime(&out_path)
            .zip(plan.max_src)
            .is_some_and(|(cache, src)| cache >= src)
            && plan.jobs.iter().all(|(_, dest)| dest.exists());

        if cache_fresh {
            debug!(cache = %out_path.display(), "reusing sanitized descriptor");
        } else {
            for (src, dest) in &plan.jobs {
                if self.copy_if_stale(src, dest)? {
                    self.stats.files_copied += 1;
                }
            }
            let body = serde_json::to_string_pretty(&sanitized).map_err(|e| AvatarError::Descriptor {
                path: out_path.clone(),
                source: e,
            })?;
            fs::write(&out_path, body).map_err(|e| AvatarError::io(&out_path, e))?;
            self.stats.descriptors_written += 1;
            let stamp = plan
                .max_src
                .map_or_else(SystemTime::now, |src| src.max(SystemTime::now()));
            set_mtime(&out_path, stamp)?;
            debug!(
                cache = %out_path.display(),
                copies = plan.jobs.len(),
                "wrote sanitized descriptor"
            );
        }

        watched.extend(plan.sources.iter().map(|p| (p.clone(), mtime(p))));
        let mut expected: Vec<PathBuf> = plan.jobs.iter().map(|(_, d)| d.clone()).collect();
        expected.push(out_path.clone());
        self.snapshots.insert(
            descriptor.to_path_buf(),
            Snapshot {
                output: out_path.clone(),
                watched,
                expected,
            },
        );
        Ok(out_path)
    }

    fn copy_if_stale(&self, src: &Path, dest: &Path) -> AvatarResult<bool> {
        let src_time = mtime(src);
        if let (Some(d), Some(s)) = (mtime(dest), src_time) {
            if d >= s {
                return Ok(false);
            }
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| AvatarError::io(parent, e))?;
        }
        fs::copy(src, dest).map_err(|e| AvatarError::io(src, e))?;
        if let Some(s) = src_time {
            set_mtime(dest, s)?;
        }
        Ok(true)
    }
}

/// Outputs planned for one sanitize pass.
struct Plan<'a> {
    model_dir: &'a Path,
    cache_root: &'a Path,
    must_copy_core: bool,
    jobs: Vec<(PathBuf, PathBuf)>,
    sources: Vec<PathBuf>,
    max_src: Option<SystemTime>,
}

impl<'a> Plan<'a> {
    fn new(model_dir: &'a Path, cache_root: &'a Path, must_copy_core: bool) -> Self {
        Self {
            model_dir,
            cache_root,
            must_copy_core,
            jobs: Vec::new(),
            sources: Vec::new(),
            max_src: None,
        }
    }

    fn note_src(&mut self, src: &Path) {
        if let Some(t) = mtime(src) {
            self.max_src = Some(self.max_src.map_or(t, |m| m.max(t)));
        }
        if !self.sources.iter().any(|p| p == src) {
            self.sources.push(src.to_path_buf());
        }
    }

    fn resolve(&self, reference: &str) -> PathBuf {
        let p = Path::new(reference);
        let joined = if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.model_dir.join(p)
        };
        joined.canonicalize().unwrap_or(joined)
    }

    fn job(&mut self, src: PathBuf, dest_rel: String) -> String {
        let dest = self.cache_root.join(&dest_rel);
        if !self.jobs.iter().any(|(_, d)| *d == dest) {
            self.jobs.push((src, dest));
        }
        dest_rel
    }

    /// Moc, textures, physics, sounds and other plain file references.
    fn core_ref(&mut self, reference: &str) -> String {
        if reference.is_empty() {
            return String::new();
        }
        let src = self.resolve(reference);
        if !src.exists() {
            return reference.to_string();
        }
        self.note_src(&src);
        if !self.must_copy_core && reference.is_ascii() {
            let rel = relative_posix(&src, self.cache_root);
            if rel.is_ascii() {
                return rel;
            }
        }
        let dest_rel = if reference.is_ascii() && !Path::new(reference).is_absolute() {
            reference.replace('\\', "/")
        } else {
            let suffix: String = full_suffix(file_name(&src)).chars().filter(char::is_ascii).collect();
            let digest = digest_hex(src.to_string_lossy().as_bytes(), 10);
            format!("assets/asset_{digest}{suffix}")
        };
        self.job(src, dest_rel)
    }

    fn expression(&mut self, src: PathBuf, idx: usize, name: Option<&str>) -> Value {
        self.note_src(&src);
        let fallback = format!("expr_{idx:02}");
        let expr_name = match name.map(str::trim) {
            Some(n) if !n.is_empty() && n.is_ascii() => n.to_string(),
            _ => fallback.clone(),
        };
        let file = self.job(src, format!("expressions/{fallback}{EXPRESSION_SUFFIX}"));
        let mut entry = Map::new();
        entry.insert("Name".into(), Value::String(expr_name));
        entry.insert("File".into(), Value::String(file));
        Value::Object(entry)
    }

    fn motion(&mut self, group: &str, src: PathBuf, idx: usize, original: Option<&Map<String, Value>>) -> Value {
        self.note_src(&src);
        let file = self.job(
            src,
            format!("motions/{}_{idx:02}{MOTION_SUFFIX}", group.to_lowercase()),
        );
        let mut item = original.cloned().unwrap_or_default();
        item.insert("File".into(), Value::String(file));
        self.rewrite_sound(&mut item);
        Value::Object(item)
    }

    fn rewrite_sound(&mut self, item: &mut Map<String, Value>) {
        if let Some(Value::String(sound)) = item.get("Sound").cloned() {
            item.insert("Sound".into(), Value::String(self.core_ref(&sound)));
        }
    }

    fn rewrite_refs(
        &mut self,
        src_refs: &Map<String, Value>,
        exp_files: &[PathBuf],
        motion_files: &[PathBuf],
    ) -> Map<String, Value> {
        let mut out = Map::new();
        for (key, value) in src_refs {
            if key == "Expressions" || key == "Motions" {
                continue;
            }
            let v = match value {
                Value::String(s) => Value::String(self.core_ref(s)),
                Value::Array(items) => Value::Array(
                    items
                        .iter()
                        .map(|it| match it {
                            Value::String(s) => Value::String(self.core_ref(s)),
                            other => other.clone(),
                        })
                        .collect(),
                ),
                other => other.clone(),
            };
            out.insert(key.clone(), v);
        }

        let expressions = self.rewrite_expressions(src_refs.get("Expressions"), exp_files);
        if !expressions.is_empty() {
            out.insert("Expressions".into(), Value::Array(expressions));
        }
        let motions = self.rewrite_motions(src_refs.get("Motions"), motion_files);
        if !motions.is_empty() {
            out.insert("Motions".into(), Value::Object(motions));
        }
        out
    }

    fn rewrite_expressions(&mut self, declared: Option<&Value>, exp_files: &[PathBuf]) -> Vec<Value> {
        let mut out = Vec::new();
        match declared.and_then(Value::as_array).filter(|l| !l.is_empty()) {
            Some(list) => {
                let mut seen: Vec<String> = Vec::new();
                for (i, entry) in list.iter().enumerate() {
                    let idx = i + 1;
                    let Some(file_ref) = entry.get("File").and_then(Value::as_str).filter(|s| !s.is_empty()) else {
                        continue;
                    };
                    let src = self.resolve(file_ref);
                    if !src.exists() {
                        continue;
                    }
                    seen.push(file_name(&src).to_string());
                    let name = entry.get("Name").and_then(Value::as_str);
                    if self.must_copy_core || !file_ref.is_ascii() || name.is_some_and(|n| !n.is_ascii()) {
                        out.push(self.expression(src, idx, name));
                    } else {
                        self.note_src(&src);
                        let mut e = Map::new();
                        let n = name.filter(|n| !n.is_empty()).map(str::to_string);
                        e.insert("Name".into(), Value::String(n.unwrap_or(format!("expr_{idx:02}"))));
                        e.insert("File".into(), Value::String(relative_posix(&src, self.cache_root)));
                        out.push(Value::Object(e));
                    }
                }
                let mut extra = list.len() + 1;
                for src in exp_files {
                    if seen.iter().any(|s| s == file_name(src)) {
                        continue;
                    }
                    out.push(self.expression(src.clone(), extra, None));
                    extra += 1;
                }
            }
            None => {
                for (i, src) in exp_files.iter().enumerate() {
                    if self.must_copy_core || !file_name(src).is_ascii() {
                        out.push(self.expression(src.clone(), i + 1, None));
                    }
                }
            }
        }
        out
    }

    fn rewrite_motions(&mut self, declared: Option<&Value>, motion_files: &[PathBuf]) -> Map<String, Value> {
        let mut out = Map::new();
        match declared.and_then(Value::as_object).filter(|m| !m.is_empty()) {
            Some(groups) => {
                for (group, items) in groups {
                    let Some(items) = items.as_array() else {
                        continue;
                    };
                    let safe_group = safe_ident(&stable_token(group, "motion"), "motion");
                    let mut list = Vec::new();
                    for (i, item) in items.iter().enumerate() {
                        let Some(obj) = item.as_object() else {
                            continue;
                        };
                        let Some(file_ref) = obj.get("File").and_then(Value::as_str).filter(|s| !s.is_empty()) else {
                            continue;
                        };
                        let src = self.resolve(file_ref);
                        if !src.exists() {
                            continue;
                        }
                        if self.must_copy_core || !file_ref.is_ascii() {
                            list.push(self.motion(&safe_group, src, i + 1, Some(obj)));
                        } else {
                            self.note_src(&src);
                            let mut copied = obj.clone();
                            copied.insert("File".into(), Value::String(relative_posix(&src, self.cache_root)));
                            self.rewrite_sound(&mut copied);
                            list.push(Value::Object(copied));
                        }
                    }
                    if !list.is_empty() {
                        out.insert(safe_group, Value::Array(list));
                    }
                }
            }
            None => {
                let mut idle = Vec::new();
                for (i, src) in motion_files.iter().enumerate() {
                    if self.must_copy_core || !file_name(src).is_ascii() {
                        idle.push(self.motion("Idle", src.clone(), i + 1, None));
                    }
                }
                if !idle.is_empty() {
                    out.insert("Idle".into(), Value::Array(idle));
                }
            }
        }
        out
    }
}

fn file_name(p: &Path) -> &str {
    p.file_name().and_then(|n| n.to_str()).unwrap_or("")
}

/// Everything from the first dot of a file name: `a.physics3.json` -> `.physics3.json`.
fn full_suffix(name: &str) -> &str {
    name.find('.').map(|i| &name[i..]).unwrap_or("")
}

fn set_mtime(path: &Path, t: SystemTime) -> AvatarResult<()> {
    fs::OpenOptions::new()
        .write(true)
        .open(path)
        .and_then(|f| f.set_modified(t))
        .map_err(|e| AvatarError::io(path, e))
}

/// First `len` hex chars of the SHA-256 of `bytes`.
pub fn digest_hex(bytes: &[u8], len: usize) -> String {
    let digest = Sha256::digest(bytes);
    let mut hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    hex.truncate(len);
    hex
}

/// `value` unchanged when ASCII, else `<prefix>_<digest>`.
pub fn stable_token(value: &str, prefix: &str) -> String {
    if value.is_ascii() {
        value.to_string()
    } else {
        format!("{prefix}_{}", digest_hex(value.as_bytes(), 10))
    }
}

/// Collapse runs outside `[A-Za-z0-9_]` into `_`; empty results become `fallback`.
pub fn safe_ident(value: &str, fallback: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            out.push(c);
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

fn value_is_ascii(v: &Value) -> bool {
    match v {
        Value::String(s) => s.is_ascii(),
        Value::Array(items) => items.iter().all(value_is_ascii),
        Value::Object(m) => m.iter().all(|(k, v)| k.is_ascii() && value_is_ascii(v)),
        _ => true,
    }
}

/// Replace any leftover non-ASCII string with `u_<digest>` and key with `k_<digest>`.
pub fn ascii_only(v: Value) -> Value {
    match v {
        Value::String(s) => Value::String(stable_token(&s, "u")),
        Value::Array(items) => Value::Array(items.into_iter().map(ascii_only).collect()),
        Value::Object(m) => Value::Object(
            m.into_iter()
                .map(|(k, v)| (stable_token(&k, "k"), ascii_only(v)))
                .collect(),
        ),
        other => other,
    }
}

/// POSIX-style path of `target` relative to `base`. Both should be absolute.
pub fn relative_posix(target: &Path, base: &Path) -> String {
    let t: Vec<Component> = target.components().collect();
    let b: Vec<Component> = base.components().collect();
    if t.first() != b.first() {
        return target.to_string_lossy().replace('\\', "/");
    }
    let common = t.iter().zip(&b).take_while(|(x, y)| x == y).count();
    let mut parts: Vec<String> = std::iter::repeat("..".to_string()).take(b.len() - common).collect();
    parts.extend(t[common..].iter().map(|c| c.as_os_str().to_string_lossy().into_owned()));
    parts.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn relative_paths_walk_up_and_down() {
        let rel = relative_posix(Path::new("/a/b/models/m/moc.moc3"), Path::new("/a/b/cache/x"));
        assert_eq!(rel, "../../models/m/moc.moc3");
        let rel = relative_posix(Path::new("/a/cache/x/y.json"), Path::new("/a/cache/x"));
        assert_eq!(rel, "y.json");
    }

    #[test]
    fn tokens_are_stable_and_ascii() {
        let a = stable_token("待机", "motion");
        assert_eq!(a, stable_token("待机", "motion"));
        assert!(a.starts_with("motion_") && a.is_ascii() && a.len() == "motion_".len() + 10);
        assert_eq!(stable_token("Idle", "motion"), "Idle");
        assert_eq!(safe_ident("Tap Body!!", "motion"), "Tap_Body");
        assert_eq!(safe_ident("--", "motion"), "motion");
    }

    #[test]
    fn ascii_pass_rewrites_keys_and_values() {
        let v = ascii_only(json!({ "名字": "猫", "Groups": [{ "Ids": ["ok", "眼"] }], "n": 3 }));
        let s = serde_json::to_string(&v).unwrap();
        assert!(s.is_ascii());
        assert_eq!(v["n"], 3);
        assert_eq!(v["Groups"][0]["Ids"][0], "ok");
    }

    #[test]
    fn suffix_keeps_compound_extensions() {
        assert_eq!(full_suffix("模型.physics3.json"), ".physics3.json");
        assert_eq!(full_suffix("noext"), "");
    }
}
