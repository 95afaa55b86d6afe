use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::{anyhow, Context, Result};
use once_cell::sync::Lazy;
use serde::Deserialize;

static MANIFEST: Lazy<Manifest> = Lazy::new(|| {
    let raw = include_str!("../../../../fixtures/manifest.json");
    serde_json::from_str(raw).expect("fixtures manifest should parse")
});

#[derive(Debug, Deserialize)]
struct Manifest {
    models: HashMap<String, ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    dir: String,
    descriptor: String,
}

fn fixtures_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../../fixtures")
}

fn lookup<'a, T>(map: &'a HashMap<String, T>, kind: &str, name: &str) -> Result<&'a T> {
    map.get(name)
        .ok_or_else(|| anyhow!("unknown {kind} fixture '{name}'"))
}

fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst).with_context(|| format!("failed to create {}", dst.display()))?;
    for entry in fs::read_dir(src).with_context(|| format!("failed to list {}", src.display()))? {
        let entry = entry?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(&from, &to)?;
        } else {
            fs::copy(&from, &to)
                .with_context(|| format!("failed to copy {} to {}", from.display(), to.display()))?;
        }
    }
    Ok(())
}

/// Template models: a descriptor plus the files it references.
pub mod models {
    use super::*;

    pub fn keys() -> Vec<String> {
        MANIFEST.models.keys().cloned().collect()
    }

    /// Read-only template directory. Tests that write should use
    /// [`materialize`] instead.
    pub fn source_dir(name: &str) -> Result<PathBuf> {
        let entry = lookup(&MANIFEST.models, "model", name)?;
        Ok(fixtures_root().join(&entry.dir))
    }

    pub fn descriptor_name(name: &str) -> Result<String> {
        Ok(lookup(&MANIFEST.models, "model", name)?.descriptor.clone())
    }

    /// Copy model `name` into a fresh temp directory under a folder called
    /// `dir_name` (which may be non-ASCII) and return handles to it.
    pub fn materialize(name: &str, dir_name: &str) -> Result<ModelDir> {
        let entry = lookup(&MANIFEST.models, "model", name)?;
        let root = tempfile::tempdir().context("failed to create temp dir")?;
        let dir = root.path().join(dir_name);
        copy_tree(&fixtures_root().join(&entry.dir), &dir)?;
        let descriptor = dir.join(&entry.descriptor);
        let cache = root.path().join("cache");
        Ok(ModelDir {
            _root: root,
            dir,
            descriptor,
            cache,
        })
    }
}

/// A model copied into a temp directory; removed on drop.
#[derive(Debug)]
pub struct ModelDir {
    _root: tempfile::TempDir,
    pub dir: PathBuf,
    pub descriptor: PathBuf,
    /// Suggested sanitizer cache location inside the same temp root.
    pub cache: PathBuf,
}

impl ModelDir {
    pub fn path(&self, rel: &str) -> PathBuf {
        self.dir.join(rel)
    }

    /// Push the mtime of `rel` a few seconds into the future so freshness
    /// checks see a change regardless of filesystem timestamp granularity.
    pub fn touch(&self, rel: &str) -> Result<()> {
        let path = self.path(rel);
        let file = fs::OpenOptions::new()
            .write(true)
            .open(&path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        file.set_modified(SystemTime::now() + Duration::from_secs(5))
            .with_context(|| format!("failed to set mtime on {}", path.display()))?;
        Ok(())
    }
}

/// Scriptable in-memory model runtime.
pub mod mock {
    use std::sync::Arc;

    use mint_avatar_core::descriptor::ModelDescriptor;
    use mint_avatar_core::{ModelRuntime, NativeError, NativeModel, NativeResult, Rgba};
    use parking_lot::Mutex;

    use super::*;

    /// Which parameter-setter call shape the mock answers.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub enum SetterShape {
        IdOnly,
        IdWeighted,
        Index,
        IndexWeighted,
        None,
    }

    #[derive(Clone, Debug)]
    pub struct Capabilities {
        pub setter: SetterShape,
        /// Parameter ids the model has; others report `UnknownParameter`.
        pub params: Vec<String>,
        pub additive_expressions: bool,
        pub set_expressions: bool,
        /// Hit areas answer `true` for the head above this y, the body below.
        pub head_max_y: Option<f32>,
        /// Part names reported under any non-head point; `None` means
        /// `hit_parts` is unsupported.
        pub hit_parts: Option<Vec<String>>,
        /// Override for `motion_groups`; `None` reads them from the descriptor.
        pub motion_groups: Option<Vec<String>>,
        /// Refuse descriptors that reference non-ASCII paths.
        pub ascii_only: bool,
        pub fail_initialize: bool,
        pub fail_draw: bool,
    }

    impl Default for Capabilities {
        fn default() -> Self {
            Self {
                setter: SetterShape::IdOnly,
                params: mint_avatar_core::params::ALL.iter().map(|s| s.to_string()).collect(),
                additive_expressions: true,
                set_expressions: true,
                head_max_y: None,
                hit_parts: None,
                motion_groups: None,
                ascii_only: true,
                fail_initialize: false,
                fail_draw: false,
            }
        }
    }

    #[derive(Clone, Debug, Default)]
    pub struct MockLog {
        pub initialized: usize,
        pub released: usize,
        pub loaded: Vec<PathBuf>,
        /// Every parameter call that named an id, including probes.
        pub param_calls: HashMap<String, usize>,
        pub values: HashMap<String, f32>,
        pub motions: Vec<(String, i32)>,
        pub expressions: Vec<String>,
        pub drags: Vec<(f32, f32)>,
        pub updates: usize,
        pub draws: usize,
        pub clears: Vec<Rgba>,
        pub scale: Option<f32>,
        pub offset: Option<(f32, f32)>,
        pub resizes: Vec<(u32, u32)>,
    }

    impl MockLog {
        pub fn calls_for(&self, id: &str) -> usize {
            self.param_calls.get(id).copied().unwrap_or(0)
        }
    }

    pub type MockHandle = Arc<Mutex<MockLog>>;

    pub struct MockRuntime {
        caps: Capabilities,
        log: MockHandle,
    }

    impl MockRuntime {
        pub fn new(caps: Capabilities) -> (Self, MockHandle) {
            let log = MockHandle::default();
            (
                Self {
                    caps,
                    log: log.clone(),
                },
                log,
            )
        }

        /// Boxed runtime ready for `AvatarController::new`.
        pub fn boxed(caps: Capabilities) -> (Box<dyn ModelRuntime>, MockHandle) {
            let (rt, log) = Self::new(caps);
            (Box::new(rt), log)
        }
    }

    fn check_ref(base: &Path, rel: &str, ascii_only: bool) -> NativeResult<()> {
        if ascii_only && !rel.is_ascii() {
            return Err(NativeError::Failed(format!("non-ASCII reference: {rel}")));
        }
        if !base.join(rel).is_file() {
            return Err(NativeError::Failed(format!("missing file: {rel}")));
        }
        Ok(())
    }

    impl ModelRuntime for MockRuntime {
        fn initialize(&mut self) -> NativeResult<()> {
            if self.caps.fail_initialize {
                return Err(NativeError::Failed("no graphics context".into()));
            }
            self.log.lock().initialized += 1;
            Ok(())
        }

        fn load_model(&mut self, descriptor: &Path) -> NativeResult<Box<dyn NativeModel>> {
            let path_text = descriptor.to_string_lossy();
            if self.caps.ascii_only && !path_text.is_ascii() {
                return Err(NativeError::Failed(format!("non-ASCII path: {path_text}")));
            }
            let desc = ModelDescriptor::load(descriptor).map_err(|e| NativeError::Failed(e.to_string()))?;
            let base = descriptor.parent().unwrap_or(Path::new("."));
            let refs = &desc.file_references;
            let moc = refs
                .moc
                .as_deref()
                .ok_or_else(|| NativeError::Failed("descriptor has no Moc".into()))?;
            check_ref(base, moc, self.caps.ascii_only)?;
            for tex in &refs.textures {
                check_ref(base, tex, self.caps.ascii_only)?;
            }
            for expr in &refs.expressions {
                check_ref(base, &expr.file, self.caps.ascii_only)?;
            }
            for group in desc.motion_groups() {
                for motion in desc.motions(&group) {
                    check_ref(base, &motion.file, self.caps.ascii_only)?;
                }
            }
            let expression_ids = refs
                .expressions
                .iter()
                .filter_map(|e| e.name.clone())
                .collect();
            let motion_groups = self
                .caps
                .motion_groups
                .clone()
                .unwrap_or_else(|| desc.motion_groups());
            let mut log = self.log.lock();
            log.loaded.push(descriptor.to_path_buf());
            Ok(Box::new(MockModel {
                caps: self.caps.clone(),
                log: self.log.clone(),
                expression_ids,
                motion_groups,
            }))
        }

        fn clear(&mut self, color: Rgba) -> NativeResult<()> {
            self.log.lock().clears.push(color);
            Ok(())
        }

        fn release(&mut self) {
            self.log.lock().released += 1;
        }
    }

    pub struct MockModel {
        caps: Capabilities,
        log: MockHandle,
        expression_ids: Vec<String>,
        motion_groups: Vec<String>,
    }

    impl MockModel {
        fn note(&self, id: &str) {
            *self.log.lock().param_calls.entry(id.to_string()).or_default() += 1;
        }

        fn write(&mut self, id: &str, value: f32) -> NativeResult<()> {
            if !self.caps.params.iter().any(|p| p == id) {
                return Err(NativeError::UnknownParameter(id.to_string()));
            }
            self.log.lock().values.insert(id.to_string(), value);
            Ok(())
        }

        fn by_index(&mut self, index: usize, value: f32) -> NativeResult<()> {
            let id = self
                .caps
                .params
                .get(index)
                .cloned()
                .ok_or_else(|| NativeError::Failed(format!("bad index {index}")))?;
            self.note(&id);
            self.write(&id, value)
        }

        fn knows_expression(&self, id: &str) -> NativeResult<()> {
            if self.expression_ids.iter().any(|e| e == id) {
                Ok(())
            } else {
                Err(NativeError::Failed(format!("unknown expression {id}")))
            }
        }
    }

    impl NativeModel for MockModel {
        fn update(&mut self, _dt: f32) -> NativeResult<()> {
            self.log.lock().updates += 1;
            Ok(())
        }

        fn draw(&mut self) -> NativeResult<()> {
            if self.caps.fail_draw {
                return Err(NativeError::Failed("draw".into()));
            }
            self.log.lock().draws += 1;
            Ok(())
        }

        fn resize(&mut self, width: u32, height: u32) -> NativeResult<()> {
            self.log.lock().resizes.push((width, height));
            Ok(())
        }

        fn set_scale(&mut self, scale: f32) -> NativeResult<()> {
            self.log.lock().scale = Some(scale);
            Ok(())
        }

        fn set_offset(&mut self, x: f32, y: f32) -> NativeResult<()> {
            self.log.lock().offset = Some((x, y));
            Ok(())
        }

        fn drag(&mut self, x: f32, y: f32) -> NativeResult<()> {
            self.log.lock().drags.push((x, y));
            Ok(())
        }

        fn motion_groups(&self) -> Vec<String> {
            self.motion_groups.clone()
        }

        fn start_random_motion(&mut self, group: &str, priority: i32) -> NativeResult<()> {
            self.log.lock().motions.push((group.to_string(), priority));
            Ok(())
        }

        fn expression_ids(&self) -> Vec<String> {
            self.expression_ids.clone()
        }

        fn add_expression(&mut self, id: &str) -> NativeResult<()> {
            if !self.caps.additive_expressions {
                return Err(NativeError::unsupported("add_expression"));
            }
            self.knows_expression(id)?;
            self.log.lock().expressions.push(format!("add {id}"));
            Ok(())
        }

        fn remove_expression(&mut self, id: &str) -> NativeResult<()> {
            if !self.caps.additive_expressions {
                return Err(NativeError::unsupported("remove_expression"));
            }
            self.log.lock().expressions.push(format!("remove {id}"));
            Ok(())
        }

        fn set_expression(&mut self, id: &str) -> NativeResult<()> {
            if !self.caps.set_expressions {
                return Err(NativeError::unsupported("set_expression"));
            }
            self.knows_expression(id)?;
            self.log.lock().expressions.push(format!("set {id}"));
            Ok(())
        }

        fn reset_expression(&mut self) -> NativeResult<()> {
            self.log.lock().expressions.push("reset".into());
            Ok(())
        }

        fn hit_test(&self, area: &str, _x: f32, y: f32) -> NativeResult<bool> {
            let Some(limit) = self.caps.head_max_y else {
                return Err(NativeError::unsupported("hit_test"));
            };
            Ok(match area {
                "Head" | "HitAreaHead" => y <= limit,
                "Body" | "HitAreaBody" => y > limit,
                _ => false,
            })
        }

        fn hit_parts(&self, _x: f32, y: f32) -> NativeResult<Vec<String>> {
            match (&self.caps.hit_parts, self.caps.head_max_y) {
                (None, _) => Err(NativeError::unsupported("hit_parts")),
                (Some(_), Some(limit)) if y <= limit => Ok(Vec::new()),
                (Some(parts), _) => Ok(parts.clone()),
            }
        }

        fn set_parameter(&mut self, id: &str, value: f32) -> NativeResult<()> {
            if self.caps.setter != SetterShape::IdOnly {
                return Err(NativeError::unsupported("set_parameter"));
            }
            self.note(id);
            self.write(id, value)
        }

        fn set_parameter_weighted(&mut self, id: &str, value: f32, _weight: f32) -> NativeResult<()> {
            if self.caps.setter != SetterShape::IdWeighted {
                return Err(NativeError::unsupported("set_parameter_weighted"));
            }
            self.note(id);
            self.write(id, value)
        }

        fn parameter_index(&self, id: &str) -> NativeResult<usize> {
            if !matches!(self.caps.setter, SetterShape::Index | SetterShape::IndexWeighted) {
                return Err(NativeError::unsupported("parameter_index"));
            }
            self.note(id);
            self.caps
                .params
                .iter()
                .position(|p| p == id)
                .ok_or_else(|| NativeError::UnknownParameter(id.to_string()))
        }

        fn set_parameter_by_index(&mut self, index: usize, value: f32) -> NativeResult<()> {
            if self.caps.setter != SetterShape::Index {
                return Err(NativeError::unsupported("set_parameter_by_index"));
            }
            self.by_index(index, value)
        }

        fn set_parameter_by_index_weighted(
            &mut self,
            index: usize,
            value: f32,
            _weight: f32,
        ) -> NativeResult<()> {
            if self.caps.setter != SetterShape::IndexWeighted {
                return Err(NativeError::unsupported("set_parameter_by_index_weighted"));
            }
            self.by_index(index, value)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_lists_models() {
        let mut keys = models::keys();
        keys.sort();
        assert_eq!(keys, ["cry", "mint", "plain"]);
        assert!(models::source_dir("mint").unwrap().join("mint.model3.json").is_file());
        assert!(models::source_dir("nope").is_err());
    }

    #[test]
    fn materialize_supports_non_ascii_dirs() {
        let m = models::materialize("mint", "薄荷").unwrap();
        assert!(m.descriptor.is_file());
        assert!(m.path("哭哭.exp3.json").is_file());
        m.touch("mint.moc3").unwrap();
    }
}
