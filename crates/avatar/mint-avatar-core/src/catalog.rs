//! Motion/expression catalog and semantic resolution.
//!
//! Maps semantic event keys ("angry", "sad", "点头", ...) and hit-part names to
//! concrete expression files or gesture kinds, picks an idle motion group by
//! name, and keeps a modification-time cached listing of a model's expressions.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use hashbrown::HashMap;
use tracing::debug;

use crate::descriptor::ModelDescriptor;
use crate::error::{AvatarError, AvatarResult};
use crate::pose::GestureKind;

pub const EXPRESSION_SUFFIX: &str = ".exp3.json";
pub const MOTION_SUFFIX: &str = ".motion3.json";
pub const MODEL_SUFFIX: &str = ".model3.json";

/// Semantic key to expression file name.
const DIRECT_EXPRESSIONS: &[(&str, &str)] = &[
    ("angry", "生气"),
    ("mad", "生气"),
    ("shy", "脸红"),
    ("blush", "脸红"),
    ("dizzy", "晕"),
    ("love", "心心眼"),
    ("like", "心心眼"),
    ("sad", "哭哭"),
    ("cry", "哭哭"),
    ("surprise", "星星眼"),
    ("surprised", "星星眼"),
    ("tail", "猫尾"),
    ("cat_tail", "猫尾"),
    ("ears", "耳朵"),
    ("ear", "耳朵"),
    ("headphones", "耳机"),
    ("headset", "耳机"),
    ("fog", "雾气"),
    ("mist", "雾气"),
    ("tongue", "舌头"),
    ("fish", "鱼干"),
    ("snack", "鱼干"),
    ("small", "变小"),
    ("smol", "变小"),
    ("black", "脸黑"),
    ("flower", "花花"),
    ("rice", "打米"),
    ("armor", "钢板"),
    ("plate", "钢板"),
    ("only_head", "只有头"),
    ("head_only", "只有头"),
    ("small_chest", "小胸"),
    ("chest", "小胸"),
];

/// Keywords searched in expression file stems, per semantic key.
const KEYWORDS: &[(&str, &[&str])] = &[
    ("angry", &["生气", "怒", "气死", "恼", "火"]),
    ("shy", &["脸红", "害羞", "羞", "不好意思"]),
    ("dizzy", &["晕", "头晕", "眩晕"]),
    ("love", &["心心眼", "喜欢", "爱", "亲", "抱"]),
    ("sad", &["哭哭", "哭", "难过", "伤心", "委屈"]),
    ("surprise", &["星星眼", "惊", "哇", "诶"]),
    ("tail", &["猫尾", "尾巴", "tail"]),
    ("ears", &["耳朵", "ears", "ear"]),
    ("headphones", &["耳机", "耳麦", "headset", "headphones"]),
    ("fog", &["雾气", "雾", "fog", "mist"]),
    ("tongue", &["舌头", "吐舌", "blep", "tongue"]),
    ("fish", &["鱼干", "小鱼", "fish"]),
    ("small", &["变小", "小小", "small", "smol"]),
    ("black", &["脸黑", "黑脸", "black"]),
    ("flower", &["花花", "花", "flower"]),
    ("rice", &["打米", "米", "rice"]),
    ("armor", &["钢板", "装甲", "armor", "plate"]),
    ("only_head", &["只有头", "只剩头", "headonly", "onlyhead"]),
    ("small_chest", &["小胸", "胸", "chest"]),
];

fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

fn stem(file: &str) -> &str {
    file.strip_suffix(EXPRESSION_SUFFIX).unwrap_or(file)
}

/// Resolve an event key or file name to one of `available` expression files.
///
/// Order: exact file name, semantic table, then keyword search in file stems.
/// The raw event takes part in the keyword search when it is a table key or
/// contains one of the table's native tokens, so unknown keys never guess.
pub fn resolve_expression<S: AsRef<str>>(event: &str, available: &[S]) -> Option<String> {
    let event = event.trim();
    if event.is_empty() || available.is_empty() {
        return None;
    }
    let files: Vec<&str> = available.iter().map(AsRef::as_ref).collect();

    if event.ends_with(EXPRESSION_SUFFIX) {
        if let Some(f) = files.iter().find(|f| *f == &event) {
            return Some(f.to_string());
        }
    }

    let key = event.to_lowercase();
    if let Some((_, target)) = DIRECT_EXPRESSIONS.iter().find(|(k, _)| *k == key) {
        let want = format!("{target}{EXPRESSION_SUFFIX}");
        if let Some(f) = files.iter().find(|f| **f == want.as_str()) {
            return Some(f.to_string());
        }
    }

    let mut terms: Vec<&str> = Vec::new();
    if let Some((_, kws)) = KEYWORDS.iter().find(|(k, _)| *k == key) {
        terms.push(event);
        terms.extend_from_slice(kws);
    } else if let Some((_, kws)) = KEYWORDS
        .iter()
        .find(|(_, kws)| kws.iter().any(|t| event.contains(t)))
    {
        terms.push(event);
        terms.extend_from_slice(kws);
    }
    let needles: Vec<String> = terms
        .iter()
        .map(|t| normalize(t))
        .filter(|t| !t.is_empty())
        .collect();
    if needles.is_empty() {
        return None;
    }
    files
        .iter()
        .find(|f| {
            let hay = normalize(stem(f));
            needles.iter().any(|n| hay.contains(n.as_str()))
        })
        .map(|f| f.to_string())
}

/// Resolve an event key to a gesture kind, or `None` when nothing fits.
pub fn resolve_gesture_kind(event: &str) -> Option<GestureKind> {
    let raw = event.trim();
    if raw.is_empty() {
        return None;
    }
    let key = raw.to_lowercase();
    let direct = match key.as_str() {
        "nod" | "yes" | "affirm" | "affirmative" | "agree" => Some(GestureKind::Nod),
        "shake" | "no" | "deny" | "negative" | "disagree" => Some(GestureKind::Shake),
        "tilt" => Some(GestureKind::Tilt),
        "lean" => Some(GestureKind::Lean),
        "look_left" => Some(GestureKind::LookLeft),
        "look_right" => Some(GestureKind::LookRight),
        "look_up" => Some(GestureKind::LookUp),
        "look_down" => Some(GestureKind::LookDown),
        "点头" | "点点头" | "肯定" => Some(GestureKind::Nod),
        "摇头" | "摇摇头" | "否定" => Some(GestureKind::Shake),
        // emotion defaults
        "angry" | "mad" => Some(GestureKind::Shake),
        "love" | "like" => Some(GestureKind::Tilt),
        "shy" => Some(GestureKind::LookDown),
        "dizzy" => Some(GestureKind::Tilt),
        "sad" => Some(GestureKind::LookDown),
        "surprise" | "surprised" => Some(GestureKind::LookUp),
        _ => None,
    };
    if direct.is_some() {
        return direct;
    }

    let has = |toks: &[&str]| toks.iter().any(|t| raw.contains(t));
    if has(&["生气", "气死", "气炸", "愤怒"]) {
        Some(GestureKind::Shake)
    } else if has(&["喜欢", "爱", "心心眼", "亲亲", "抱抱"]) {
        Some(GestureKind::Tilt)
    } else if has(&["害羞", "脸红"]) {
        Some(GestureKind::LookDown)
    } else if has(&["头晕", "晕"]) {
        Some(GestureKind::Tilt)
    } else if has(&["难过", "哭"]) {
        Some(GestureKind::LookDown)
    } else if has(&["惊讶", "星星眼"]) {
        Some(GestureKind::LookUp)
    } else {
        None
    }
}

/// Map drawable part ids under a tap to a semantic event key, most specific
/// part first.
pub fn event_key_for_hit_parts<S: AsRef<str>>(parts: &[S]) -> Option<&'static str> {
    let tokens = parts
        .iter()
        .map(|p| p.as_ref())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    if tokens.is_empty() {
        return None;
    }
    const TABLE: &[(&[&str], &str)] = &[
        (&["tail", "尾"], "tail"),
        (&["headphone", "headset", "耳机"], "headphones"),
        (&["ear", "耳"], "ears"),
        (&["tongue", "舌"], "tongue"),
        (&["fish", "鱼"], "fish"),
        (&["flower", "花"], "flower"),
        (&["armor", "plate", "钢板"], "armor"),
        (&["black", "黑"], "black"),
    ];
    TABLE
        .iter()
        .find(|(needles, _)| needles.iter().any(|n| tokens.contains(n)))
        .map(|(_, key)| *key)
}

/// Pick the motion group used for idle playback.
pub fn pick_idle_motion_group<S: AsRef<str>>(groups: &[S]) -> String {
    let keys: Vec<&str> = groups
        .iter()
        .map(AsRef::as_ref)
        .filter(|k| !k.is_empty())
        .collect();
    const EXACT: [&str; 4] = ["idle", "default", "standby", "waiting"];
    const TOKENS: [&str; 5] = ["idle", "standby", "default", "wait", "stand"];
    const TOKENS_CN: [&str; 4] = ["待机", "站立", "默认", "呼吸"];

    if let Some(k) = keys
        .iter()
        .find(|k| EXACT.contains(&k.to_lowercase().as_str()))
    {
        return k.to_string();
    }
    if let Some(k) = keys.iter().find(|k| {
        let low = k.to_lowercase();
        TOKENS.iter().any(|t| low.contains(t)) || TOKENS_CN.iter().any(|t| k.contains(t))
    }) {
        return k.to_string();
    }
    keys.first()
        .map(|k| k.to_string())
        .unwrap_or_else(|| "Idle".to_string())
}

/// Accept a `*.model3.json` path or a directory holding one.
pub fn find_model_descriptor(path: &Path) -> AvatarResult<PathBuf> {
    if path.is_file() {
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        if name.ends_with(MODEL_SUFFIX) {
            return Ok(path.to_path_buf());
        }
        return Err(AvatarError::DescriptorNotFound(path.to_path_buf()));
    }
    if path.is_dir() {
        let mut found: Vec<PathBuf> = fs::read_dir(path)
            .map_err(|e| AvatarError::io(path, e))?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| {
                p.is_file()
                    && p.file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| n.ends_with(MODEL_SUFFIX))
            })
            .collect();
        found.sort();
        if let Some(first) = found.into_iter().next() {
            return Ok(first);
        }
    }
    Err(AvatarError::DescriptorNotFound(path.to_path_buf()))
}

/// Files in `dir` ending with `suffix`, sorted by name.
pub(crate) fn list_with_suffix(dir: &Path, suffix: &str) -> Vec<PathBuf> {
    let mut out: Vec<PathBuf> = match fs::read_dir(dir) {
        Ok(rd) => rd
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| {
                p.is_file()
                    && p.file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| n.ends_with(suffix))
            })
            .collect(),
        Err(_) => Vec::new(),
    };
    out.sort();
    out
}

pub(crate) fn mtime(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

fn file_name_of(reference: &str) -> &str {
    reference
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(reference)
}

/// Expression files of one source model and the native ids each may load as.
///
/// A declared `Name` is tried first, then the `expr_NN` id the sanitizer
/// assigns (1-based, listed entries first, unlisted files after).
#[derive(Clone, Debug)]
pub struct ExpressionCatalog {
    descriptor: PathBuf,
    files: Vec<String>,
    candidates: HashMap<String, Vec<String>>,
    /// True when the descriptor lists its expressions explicitly.
    declared: bool,
    snapshot: Option<SystemTime>,
    builds: usize,
}

impl ExpressionCatalog {
    pub fn new(descriptor: impl Into<PathBuf>) -> Self {
        let mut cat = Self {
            descriptor: descriptor.into(),
            files: Vec::new(),
            candidates: HashMap::new(),
            declared: false,
            snapshot: None,
            builds: 0,
        };
        cat.rebuild();
        cat
    }

    pub fn descriptor(&self) -> &Path {
        &self.descriptor
    }

    /// Number of times the listing was rebuilt from disk.
    pub fn builds(&self) -> usize {
        self.builds
    }

    fn model_dir(&self) -> PathBuf {
        self.descriptor
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
    }

    fn current_stamp(&self) -> Option<SystemTime> {
        let dir = self.model_dir();
        let mut stamp = [mtime(&self.descriptor), mtime(&dir)]
            .into_iter()
            .flatten()
            .max();
        for f in &self.files {
            if let Some(t) = mtime(&dir.join(f)) {
                stamp = Some(stamp.map_or(t, |s| s.max(t)));
            }
        }
        stamp
    }

    /// Rebuild if the descriptor, the model directory, or a listed file was
    /// modified after the last build. Returns whether a rebuild happened.
    pub fn refresh(&mut self) -> bool {
        let stamp = self.current_stamp();
        let advanced = match (stamp, self.snapshot) {
            (Some(now), Some(prev)) => now > prev,
            (Some(_), None) => true,
            _ => false,
        };
        if advanced {
            self.rebuild();
        }
        advanced
    }

    fn rebuild(&mut self) {
        self.builds += 1;
        self.files.clear();
        self.candidates.clear();
        self.declared = false;

        let dir = self.model_dir();
        let on_disk: Vec<String> = list_with_suffix(&dir, EXPRESSION_SUFFIX)
            .iter()
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(str::to_string))
            .collect();

        let declared = ModelDescriptor::load(&self.descriptor)
            .ok()
            .map(|d| d.file_references.expressions)
            .filter(|list| !list.is_empty());

        if let Some(list) = declared {
            self.declared = true;
            for (i, entry) in list.iter().enumerate() {
                let name = file_name_of(&entry.file).to_string();
                if name.is_empty() || (!on_disk.is_empty() && !on_disk.contains(&name)) {
                    continue;
                }
                let mut ids = Vec::new();
                if let Some(n) = entry.name.as_deref().map(str::trim) {
                    if !n.is_empty() {
                        ids.push(n.to_string());
                    }
                }
                ids.push(format!("expr_{:02}", i + 1));
                self.candidates.insert(name.clone(), ids);
                self.files.push(name);
            }
            let mut extra = list.len() + 1;
            for f in &on_disk {
                if self.candidates.contains_key(f) {
                    continue;
                }
                self.candidates
                    .insert(f.clone(), vec![format!("expr_{extra:02}")]);
                self.files.push(f.clone());
                extra += 1;
            }
        }
        if self.files.is_empty() {
            self.declared = false;
            for (i, f) in on_disk.iter().enumerate() {
                self.candidates
                    .insert(f.clone(), vec![format!("expr_{:02}", i + 1)]);
                self.files.push(f.clone());
            }
        }
        self.snapshot = self.current_stamp();
        debug!(
            descriptor = %self.descriptor.display(),
            count = self.files.len(),
            "expression catalog rebuilt"
        );
    }

    /// Expression file names, refreshing first if anything advanced.
    pub fn files(&mut self) -> &[String] {
        self.refresh();
        &self.files
    }

    /// Native ids to try for `file`. Empty when the file is unknown.
    pub fn candidate_ids(&mut self, file: &str) -> Vec<String> {
        self.refresh();
        self.candidates.get(file.trim()).cloned().unwrap_or_default()
    }

    /// Resolve an event key against this model's expressions.
    pub fn resolve(&mut self, event: &str) -> Option<String> {
        self.refresh();
        resolve_expression(event, &self.files)
    }
}
