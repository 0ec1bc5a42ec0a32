//! Keymap compilation and distribution.
//!
//! The compiler is the `KeymapEngine` collaborator, backed by xkbcommon.
//! Clients receive the keymap text through a read-only shared-memory fd
//! produced by a two-descriptor pattern: the writable side is unlinked
//! and stripped of permissions before the payload is written, so the fd
//! handed out stays read-only even if the name were ever re-derived.

use std::fs::File;
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use xkbcommon::xkb;

/// Fallback keymap used when the system xkb data is unavailable.
pub const MINIMAL_KEYMAP: &str = "xkb_keymap {
    xkb_keycodes  { minimum = 8; maximum = 255; };
    xkb_types     { };
    xkb_compat    { };
    xkb_symbols   { };
};
";

/// Keymap compiler contract. Keycodes passed in are already offset by
/// +8 from the backend's raw codes (the historical X11 convention); the
/// results feed logging and future bindings, never the wire.
pub trait KeymapEngine {
    /// The text blob distributed to clients, without trailing NUL.
    fn keymap_text(&self) -> &str;

    fn update_mask(&mut self, depressed: u32, latched: u32, locked: u32, group: u32);

    fn key_get_sym_name(&self, xkb_keycode: u32) -> String;

    fn key_get_utf8(&self, xkb_keycode: u32) -> String;
}

/// xkbcommon-backed engine.
pub struct XkbEngine {
    _context: xkb::Context,
    _keymap: xkb::Keymap,
    state: xkb::State,
    text: String,
}

impl XkbEngine {
    /// Compile from the default names, falling back to the built-in
    /// minimal keymap when no xkb data is installed.
    pub fn new() -> Result<Self> {
        let context = xkb::Context::new(xkb::CONTEXT_NO_FLAGS);
        let keymap = xkb::Keymap::new_from_names(
            &context,
            "",
            "",
            "",
            "",
            None,
            xkb::KEYMAP_COMPILE_NO_FLAGS,
        )
        .or_else(|| {
            tracing::warn!("keymap compilation from names failed; using built-in minimal keymap");
            xkb::Keymap::new_from_string(
                &context,
                MINIMAL_KEYMAP.to_string(),
                xkb::KEYMAP_FORMAT_TEXT_V1,
                xkb::KEYMAP_COMPILE_NO_FLAGS,
            )
        });
        let Some(keymap) = keymap else {
            bail!("xkb keymap compilation failed");
        };

        let state = xkb::State::new(&keymap);
        let text = keymap.get_as_string(xkb::KEYMAP_FORMAT_TEXT_V1);
        Ok(XkbEngine { _context: context, _keymap: keymap, state, text })
    }
}

impl KeymapEngine for XkbEngine {
    fn keymap_text(&self) -> &str {
        &self.text
    }

    fn update_mask(&mut self, depressed: u32, latched: u32, locked: u32, group: u32) {
        self.state.update_mask(depressed, latched, locked, 0, 0, group);
    }

    fn key_get_sym_name(&self, xkb_keycode: u32) -> String {
        xkb::keysym_get_name(self.state.key_get_one_sym(xkb_keycode.into()))
    }

    fn key_get_utf8(&self, xkb_keycode: u32) -> String {
        self.state.key_get_utf8(xkb_keycode.into())
    }
}

/// Render key UTF-8 for log lines: keep alphanumerics, escape the rest.
pub fn escape_utf8(input: &str) -> String {
    let mut out = String::new();
    for c in input.chars() {
        match c {
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\x08' => out.push_str("\\b"),
            '\x0c' => out.push_str("\\f"),
            c if c.is_ascii_alphanumeric() => out.push(c),
            c => out.push_str(&format!("\\{:x}", c as u32)),
        }
    }
    out
}

/// A read-only shared file plus its payload size, ready to hand to
/// clients.
#[derive(Debug)]
pub struct SealedFile {
    pub file: File,
    pub size: u32,
}

/// Write `payload` into an anonymous shared file and return a
/// read-only descriptor for it.
///
/// Order matters: the name is unlinked and the writable descriptor's
/// permissions dropped to 0 before any payload lands, so no other
/// opener can reach the contents writable.
pub fn create_sealed_file(payload: &[u8]) -> Result<SealedFile> {
    let runtime_dir: PathBuf = std::env::var_os("XDG_RUNTIME_DIR")
        .context("XDG_RUNTIME_DIR is not set")?
        .into();

    let size = payload.len();
    for _ in 0..32 {
        let path = runtime_dir.join(format!("tioga-shared-{:08x}", rand::random::<u32>()));
        let rw = match std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .mode(0o600)
            .open(&path)
        {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(err) => return Err(err).context("creating shared file"),
        };

        let ro = File::open(&path).context("reopening shared file read-only")?;
        std::fs::remove_file(&path).context("unlinking shared file")?;
        rw.set_permissions(std::fs::Permissions::from_mode(0))
            .context("dropping shared file permissions")?;
        rw.set_len(size as u64).context("sizing shared file")?;

        let mut map = unsafe { memmap2::MmapOptions::new().len(size).map_mut(&rw) }
            .context("mapping shared file")?;
        map.copy_from_slice(payload);
        drop(map);
        drop(rw);

        return Ok(SealedFile { file: ro, size: size as u32 });
    }
    bail!("could not allocate a fresh shared file name");
}

/// Shared runtime dir for the whole test process; the env variable is
/// process-global, so every test module points it at the same place.
#[cfg(test)]
pub(crate) fn ensure_test_runtime_dir() -> std::path::PathBuf {
    use std::sync::OnceLock;
    static DIR: OnceLock<std::path::PathBuf> = OnceLock::new();
    DIR.get_or_init(|| {
        let dir = std::env::temp_dir().join(format!("tioga-tests-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::env::set_var("XDG_RUNTIME_DIR", &dir);
        dir
    })
    .clone()
}

// ============================================================================
// Tests
// ============================================================================
