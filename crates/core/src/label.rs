//! Label store.
//!
//! Globals live in insertion order, and each global owns the local
//! labels (`.name`) defined under it. Setting a global switches the
//! current scope to it; a scope stack lets macro invocations push an
//! anonymous namespace global and restore the caller's scope afterwards
//! without disturbing any values. The stack holds indices into the
//! globals vector, never references, so there is no ownership cycle.
//!
//! All name comparisons are ASCII case-insensitive; names are stored as
//! first written.

use crate::text::eq_ignore_case;

/// Longest accepted label name.
pub const MAX_LABEL_SIZE: usize = 32;

/// What a label is, or — for lookups and updates — what to accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelKind {
    Global,
    Local,
    /// For `find`: either kind. For `set`: update the current global if
    /// the name matches it, otherwise a local under it, without moving
    /// the scope (the `EQU` path).
    Any,
}

#[derive(Debug, Clone)]
pub struct Label {
    pub name: String,
    pub value: i64,
    pub kind: LabelKind,
}

#[derive(Debug, Clone)]
struct GlobalEntry {
    label: Label,
    locals: Vec<Label>,
}

impl GlobalEntry {
    fn find_local(&self, name: &str) -> Option<usize> {
        let name = clip(name);
        self.locals.iter().position(|l| eq_ignore_case(&l.name, name))
    }
}

#[derive(Debug, Default)]
pub struct LabelStore {
    globals: Vec<GlobalEntry>,
    /// Index of the global whose locals are in scope.
    scope: Option<usize>,
    scope_stack: Vec<Option<usize>>,
    namespace: String,
}

impl LabelStore {
    pub fn new() -> LabelStore {
        let mut store = LabelStore::default();
        store.reset_namespace();
        store
    }

    /// Forget every label and the scope stack.
    pub fn clear(&mut self) {
        self.globals.clear();
        self.scope = None;
        self.scope_stack.clear();
    }

    fn find_global(&self, name: &str) -> Option<usize> {
        let name = clip(name);
        self.globals.iter().position(|g| eq_ignore_case(&g.label.name, name))
    }

    fn add_global(&mut self, name: &str, value: i64) {
        let name = clip(name);
        match self.find_global(name) {
            Some(i) => {
                self.globals[i].label.value = value;
                self.scope = Some(i);
            }
            None => {
                self.globals.push(GlobalEntry {
                    label: Label {
                        name: name.to_string(),
                        value,
                        kind: LabelKind::Global,
                    },
                    locals: Vec::new(),
                });
                self.scope = Some(self.globals.len() - 1);
            }
        }
    }

    fn add_local(&mut self, name: &str, value: i64) -> Result<(), String> {
        let scope = self
            .scope
            .ok_or_else(|| format!("no current scope for local label '{name}'"))?;
        let name = clip(name);
        let entry = &mut self.globals[scope];

        match entry.find_local(name) {
            Some(i) => entry.locals[i].value = value,
            None => entry.locals.push(Label {
                name: name.to_string(),
                value,
                kind: LabelKind::Local,
            }),
        }

        Ok(())
    }

    /// Add or update a label.
    pub fn set(&mut self, name: &str, value: i64, kind: LabelKind) -> Result<(), String> {
        match kind {
            LabelKind::Global => {
                self.add_global(name, value);
                self.scope_stack.clear();
                Ok(())
            }
            LabelKind::Local => self.add_local(name, value),
            LabelKind::Any => match self.scope {
                Some(i) if eq_ignore_case(&self.globals[i].label.name, clip(name)) => {
                    self.globals[i].label.value = value;
                    Ok(())
                }
                Some(_) => self.add_local(name, value),
                None => Err(format!("no current scope for label '{name}'")),
            },
        }
    }

    /// Look a label up: locals of the current scope first, then
    /// globals, filtered by `kind`. A leading `.` forces the local
    /// namespace, matching how local labels are written in
    /// expressions.
    pub fn find(&self, name: &str, kind: LabelKind) -> Option<&Label> {
        let (name, kind) = match name.strip_prefix('.') {
            Some(rest) if !matches!(kind, LabelKind::Global) => (rest, LabelKind::Local),
            Some(_) => return None,
            None => (name, kind),
        };

        if matches!(kind, LabelKind::Local | LabelKind::Any)
            && let Some(scope) = self.scope
            && let Some(i) = self.globals[scope].find_local(name)
        {
            return Some(&self.globals[scope].locals[i]);
        }

        if matches!(kind, LabelKind::Global | LabelKind::Any)
            && let Some(i) = self.find_global(name)
        {
            return Some(&self.globals[i].label);
        }

        None
    }

    /// Save the current scope and enter a fresh global named `name`.
    pub fn scope_push(&mut self, name: &str, value: i64) {
        self.scope_stack.push(self.scope);
        self.add_global(name, value);
    }

    /// Restore the scope saved by the matching `scope_push`.
    pub fn scope_pop(&mut self) -> Result<(), String> {
        match self.scope_stack.pop().flatten() {
            Some(i) => {
                self.scope = Some(i);
                Ok(())
            }
            None => Err("popping the global scope left it empty".to_string()),
        }
    }

    /// Strip label decoration in place: a leading `.` marks a local, a
    /// trailing `:` is dropped. Returns the kind, or `None` for an
    /// empty result.
    pub fn sanitise(label: &str) -> Option<(&str, LabelKind)> {
        let (label, kind) = match label.strip_prefix('.') {
            Some(rest) => (rest, LabelKind::Local),
            None => (label, LabelKind::Global),
        };
        let label = label.strip_suffix(':').unwrap_or(label);

        if label.is_empty() { None } else { Some((label, kind)) }
    }

    /// Produce the next deterministic namespace name: `_` followed by a
    /// 31-digit odometer. The sequence restarts every pass so macro
    /// invocation *k* lands in the same namespace on every pass.
    pub fn make_namespace(&mut self) -> String {
        if self.namespace.is_empty() {
            self.reset_namespace();
        }

        let mut digits: Vec<u8> = self.namespace.bytes().collect();
        if let Some(d) = digits.iter_mut().skip(1).find(|d| **d != b'9') {
            *d += 1;
        }

        self.namespace = String::from_utf8(digits).unwrap();
        self.namespace.clone()
    }

    pub fn reset_namespace(&mut self) {
        self.namespace = format!("_{}", "0".repeat(MAX_LABEL_SIZE - 1));
    }

    /// Iterate globals (and their locals) in insertion order, for the
    /// listing dump.
    pub fn globals(&self) -> impl Iterator<Item = (&Label, &[Label])> {
        self.globals.iter().map(|g| (&g.label, g.locals.as_slice()))
    }

    fn exported(&self) -> impl Iterator<Item = &Label> {
        self.globals
            .iter()
            .map(|g| &g.label)
            .filter(|l| !l.name.starts_with('_'))
    }

    /// Append the label blob: an 11-digit count, then per label the
    /// NUL-terminated name and an 11-digit zero-padded signed value.
    /// Locals and private (`_`-prefixed) globals are not exported.
    pub fn write_blob(&self, out: &mut Vec<u8>) {
        let count = self.exported().count();
        out.extend_from_slice(format!("{count:011}").as_bytes());

        for label in self.exported() {
            out.extend_from_slice(label.name.as_bytes());
            out.push(0);
            out.extend_from_slice(format!("{:011}", label.value).as_bytes());
        }
    }

    /// Read a blob written by `write_blob`, adding `offset` to every
    /// value. `pos` advances past the blob.
    pub fn read_blob(&mut self, data: &[u8], pos: &mut usize, offset: i64) -> Result<(), String> {
        let count = read_number(data, pos)?;

        for _ in 0..count {
            let name = read_name(data, pos)?;
            let value = read_number(data, pos)?;
            self.set(&name, value + offset, LabelKind::Global)?;
        }

        Ok(())
    }
}

/// Names are capped at [`MAX_LABEL_SIZE`]; longer ones are silently
/// clipped, so an over-long reference still finds its label.
fn clip(name: &str) -> &str {
    let mut end = name.len().min(MAX_LABEL_SIZE);
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

fn read_number(data: &[u8], pos: &mut usize) -> Result<i64, String> {
    let end = *pos + 11;
    let bytes = data.get(*pos..end).ok_or("truncated label blob")?;
    *pos = end;

    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| "bad number in label blob".to_string())
}

fn read_name(data: &[u8], pos: &mut usize) -> Result<String, String> {
    let mut name = Vec::new();

    loop {
        let b = *data.get(*pos).ok_or("truncated label blob")?;
        *pos += 1;

        if b == 0 {
            break;
        }
        if name.len() < MAX_LABEL_SIZE {
            name.push(b);
        }
    }

    String::from_utf8(name).map_err(|_| "bad name in label blob".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_set_and_find() {
        let mut store = LabelStore::new();
        store.set("start", 0x8000, LabelKind::Global).unwrap();
        assert_eq!(store.find("START", LabelKind::Any).unwrap().value, 0x8000);
        assert!(store.find("start", LabelKind::Local).is_none());
    }

    #[test]
    fn test_locals_scoped_to_global() {
        let mut store = LabelStore::new();
        store.set("one", 1, LabelKind::Global).unwrap();
        store.set("l", 10, LabelKind::Local).unwrap();
        store.set("two", 2, LabelKind::Global).unwrap();
        store.set("l", 20, LabelKind::Local).unwrap();

        // Same local name, independent values per scope.
        assert_eq!(store.find("l", LabelKind::Any).unwrap().value, 20);
        store.set("one", 1, LabelKind::Global).unwrap();
        assert_eq!(store.find("l", LabelKind::Any).unwrap().value, 10);
    }

    #[test]
    fn test_local_without_scope_fails() {
        let mut store = LabelStore::new();
        assert!(store.set("l", 0, LabelKind::Local).is_err());
    }

    #[test]
    fn test_any_updates_current_global() {
        let mut store = LabelStore::new();
        store.set("value", 0, LabelKind::Global).unwrap();
        store.set("value", 42, LabelKind::Any).unwrap();
        assert_eq!(store.find("value", LabelKind::Global).unwrap().value, 42);
    }

    #[test]
    fn test_any_adds_local_for_other_names() {
        let mut store = LabelStore::new();
        store.set("outer", 0, LabelKind::Global).unwrap();
        store.set("inner", 7, LabelKind::Any).unwrap();
        assert_eq!(store.find("inner", LabelKind::Local).unwrap().value, 7);
        // Scope unchanged.
        store.set("more", 8, LabelKind::Local).unwrap();
        assert_eq!(store.find("more", LabelKind::Any).unwrap().value, 8);
    }

    #[test]
    fn test_dotted_lookup_is_local() {
        let mut store = LabelStore::new();
        store.set("outer", 0, LabelKind::Global).unwrap();
        store.set("l", 42, LabelKind::Local).unwrap();
        assert_eq!(store.find(".l", LabelKind::Any).unwrap().value, 42);
        assert!(store.find(".outer", LabelKind::Any).is_none());
    }

    #[test]
    fn test_scope_push_pop() {
        let mut store = LabelStore::new();
        store.set("caller", 0, LabelKind::Global).unwrap();
        store.set("here", 5, LabelKind::Local).unwrap();

        store.scope_push("_ns", 0x100);
        store.set("here", 99, LabelKind::Local).unwrap();
        assert_eq!(store.find("here", LabelKind::Any).unwrap().value, 99);

        store.scope_pop().unwrap();
        assert_eq!(store.find("here", LabelKind::Any).unwrap().value, 5);
    }

    #[test]
    fn test_sanitise() {
        assert_eq!(LabelStore::sanitise("loop:"), Some(("loop", LabelKind::Global)));
        assert_eq!(LabelStore::sanitise(".l"), Some(("l", LabelKind::Local)));
        assert_eq!(LabelStore::sanitise(".l:"), Some(("l", LabelKind::Local)));
        assert_eq!(LabelStore::sanitise(":"), None);
        assert_eq!(LabelStore::sanitise("."), None);
    }

    #[test]
    fn test_namespaces_deterministic() {
        let mut store = LabelStore::new();
        let a = store.make_namespace();
        let b = store.make_namespace();
        assert_ne!(a, b);
        assert!(a.starts_with('_'));
        assert_eq!(a.len(), MAX_LABEL_SIZE);

        store.reset_namespace();
        assert_eq!(store.make_namespace(), a);
        assert_eq!(store.make_namespace(), b);
    }

    #[test]
    fn test_blob_round_trip() {
        let mut store = LabelStore::new();
        store.set("start", 0x1000, LabelKind::Global).unwrap();
        store.set("loop", 0x1003, LabelKind::Global).unwrap();
        store.set("hidden", -1, LabelKind::Local).unwrap();
        store.set("_private", 9, LabelKind::Global).unwrap();

        let mut blob = Vec::new();
        store.write_blob(&mut blob);

        let mut other = LabelStore::new();
        let mut pos = 0;
        other.read_blob(&blob, &mut pos, 0x100).unwrap();
        assert_eq!(pos, blob.len());

        assert_eq!(other.find("start", LabelKind::Global).unwrap().value, 0x1100);
        assert_eq!(other.find("loop", LabelKind::Global).unwrap().value, 0x1103);
        assert!(other.find("_private", LabelKind::Global).is_none());
        assert!(other.find("hidden", LabelKind::Any).is_none());
    }

    #[test]
    fn test_negative_value_round_trip() {
        let mut store = LabelStore::new();
        store.set("below", -5, LabelKind::Global).unwrap();

        let mut blob = Vec::new();
        store.write_blob(&mut blob);

        let mut other = LabelStore::new();
        let mut pos = 0;
        other.read_blob(&blob, &mut pos, 0).unwrap();
        assert_eq!(other.find("below", LabelKind::Global).unwrap().value, -5);
    }
}
