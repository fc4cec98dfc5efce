//! In-process semantic backends for integration tests.
//!
//! `FakeServer` answers outlines with the syntax extractor's declarations and
//! resolves a definition request by reading the identifier under the cursor
//! and looking for `def <name>` in the Python files under its root.

#![allow(dead_code)]

use codegraph_core::ingest::Declaration;
use codegraph_core::semantic::{Location, Position};
use codegraph_core::{
    detect_language, Language, SemanticBackend, SemanticError, SessionFactory, SyntaxExtractor,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};
use walkdir::WalkDir;

/// Blocks requests until released.
#[derive(Default)]
pub struct Gate {
    entered: AtomicBool,
    open: Mutex<bool>,
    opened: Condvar,
}

impl Gate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn pass(&self) {
        self.entered.store(true, Ordering::SeqCst);
        let mut open = self.open.lock().unwrap();
        while !*open {
            open = self.opened.wait(open).unwrap();
        }
    }

    pub fn release(&self) {
        *self.open.lock().unwrap() = true;
        self.opened.notify_all();
    }

    /// True once some request is parked at the gate.
    pub fn wait_entered(&self, timeout: Duration) -> bool {
        let started = Instant::now();
        while !self.entered.load(Ordering::SeqCst) {
            if started.elapsed() > timeout {
                return false;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        true
    }
}

pub struct FakeServer {
    root: PathBuf,
    gate: Option<Arc<Gate>>,
    outline_gate: Option<Arc<Gate>>,
}

fn identifier_at(path: &Path, line: usize, column: usize) -> Option<String> {
    let text = fs::read_to_string(path).ok()?;
    let line = text.lines().nth(line.checked_sub(1)?)?;
    let ident: String = line
        .get(column..)?
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    (!ident.is_empty()).then_some(ident)
}

impl FakeServer {
    fn find_definition(&self, name: &str) -> Option<Location> {
        let needle = format!("def {}(", name);
        for entry in WalkDir::new(&self.root).sort_by_file_name() {
            let entry = entry.ok()?;
            if entry.path().extension().and_then(|e| e.to_str()) != Some("py") {
                continue;
            }
            let text = fs::read_to_string(entry.path()).ok()?;
            for (idx, line) in text.lines().enumerate() {
                if let Some(pos) = line.find(&needle) {
                    return Some(Location {
                        path: entry.path().to_path_buf(),
                        line: idx + 1,
                        column: pos + 4,
                    });
                }
            }
        }
        None
    }
}

impl SemanticBackend for FakeServer {
    fn outline(&self, path: &Path) -> Result<Vec<Declaration>, SemanticError> {
        if let Some(gate) = &self.outline_gate {
            gate.pass();
        }
        let text = fs::read_to_string(path)?;
        let language = detect_language(path)
            .ok_or_else(|| SemanticError::Unsupported(path.display().to_string()))?;
        Ok(SyntaxExtractor::new().extract(&text, language).declarations)
    }

    fn resolve_definitions(
        &self,
        path: &Path,
        positions: &[Position],
    ) -> Result<Vec<Vec<Location>>, SemanticError> {
        if let Some(gate) = &self.gate {
            gate.pass();
        }
        Ok(positions
            .iter()
            .map(|p| {
                identifier_at(path, p.line, p.column)
                    .and_then(|name| self.find_definition(&name))
                    .into_iter()
                    .collect()
            })
            .collect())
    }
}

#[derive(Default)]
pub struct FakeFactory {
    pub spawns: AtomicUsize,
    pub missing: bool,
    /// Parks definition requests
    pub gate: Option<Arc<Gate>>,
    /// Parks outline requests
    pub outline_gate: Option<Arc<Gate>>,
}

impl FakeFactory {
    pub fn working() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn missing() -> Arc<Self> {
        Arc::new(Self {
            missing: true,
            ..Self::default()
        })
    }

    pub fn gated(gate: Arc<Gate>) -> Arc<Self> {
        Arc::new(Self {
            gate: Some(gate),
            ..Self::default()
        })
    }

    pub fn outline_gated(gate: Arc<Gate>) -> Arc<Self> {
        Arc::new(Self {
            outline_gate: Some(gate),
            ..Self::default()
        })
    }

    pub fn spawn_count(&self) -> usize {
        self.spawns.load(Ordering::SeqCst)
    }
}

impl SessionFactory for FakeFactory {
    fn spawn(
        &self,
        _language: Language,
        root: &Path,
    ) -> Result<Arc<dyn SemanticBackend>, SemanticError> {
        self.spawns.fetch_add(1, Ordering::SeqCst);
        if self.missing {
            return Err(SemanticError::MissingBinary("fake-ls".into()));
        }
        Ok(Arc::new(FakeServer {
            root: root.to_path_buf(),
            gate: self.gate.clone(),
            outline_gate: self.outline_gate.clone(),
        }))
    }
}

/// Write `files` under `root`, creating parent directories.
pub fn write_repo(root: &Path, files: &[(&str, &str)]) {
    for (name, text) in files {
        let path = root.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, text).unwrap();
    }
}
