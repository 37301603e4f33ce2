//! Process-wide caches and registries (specification §9): a table of the
//! built-in predefined CMaps, an interner for the single-character strings
//! simple-font decoding produces over and over, and a pool assigning small
//! integer ids to font names. All three are lazily initialised on first use
//! and expose a `clear()` for long-lived hosts that open many documents in
//! one process and don't want decoding history from document N to outlive
//! it.
//!
//! Grounded in the teacher's `lazy_static`-backed static tables (e.g.
//! `fonts::BUILTIN` in the pack's font-handling examples) for the
//! const-shaped registry, and in `once_cell::sync::Lazy` for the two caches
//! that need an explicit reset hook `lazy_static!` doesn't offer.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;

lazy_static::lazy_static! {
    /// Predefined CMap names this engine recognises without reading an
    /// embedded CMap program, mapped to their writing mode (specification
    /// §4.6: "Identity-H/Identity-V... the writing mode is part of the
    /// name"). Genuinely CJK predefined CMaps (`GBK-EUC-H` and similar)
    /// have real code-to-CID tables that are out of scope to embed; a name
    /// this table doesn't know falls back to identity decoding rather than
    /// failing the font.
    static ref BUILTIN_CMAPS: HashMap<&'static str, bool> = {
        let mut m = HashMap::new();
        m.insert("Identity-H", false);
        m.insert("Identity-V", true);
        m
    };
}

/// Returns the writing mode (`true` = vertical) for a predefined CMap name,
/// or `None` when the name isn't one of the built-ins.
pub fn builtin_cmap_vertical(name: &[u8]) -> Option<bool> {
    std::str::from_utf8(name).ok().and_then(|s| BUILTIN_CMAPS.get(s).copied())
}

static RUNE_CACHE: Lazy<Mutex<HashMap<u32, Arc<str>>>> = Lazy::new(|| Mutex::new(HashMap::new()));

/// Intern the rendered form of a decoded character code, keyed by the code
/// itself rather than the resulting string, so repeated occurrences of the
/// same code across a document's many content streams (by far the common
/// case for body text) share one allocation instead of formatting a fresh
/// `String` every time.
pub fn intern_rune(code: u32, rendered: impl FnOnce() -> String) -> Arc<str> {
    let mut cache = RUNE_CACHE.lock();
    if let Some(s) = cache.get(&code) {
        return s.clone();
    }
    let s: Arc<str> = Arc::from(rendered());
    cache.insert(code, s.clone());
    s
}

/// Drop every interned rune. Safe to call between documents in a long-lived
/// host process; codes are not guaranteed stable across unrelated fonts, so
/// nothing relies on entries surviving past the document that produced them.
pub fn clear_rune_cache() {
    RUNE_CACHE.lock().clear();
}

static FONT_POOL: Lazy<Mutex<(HashMap<Vec<u8>, u32>, u32)>> = Lazy::new(|| Mutex::new((HashMap::new(), 0)));

/// Map a `/BaseFont` name to a small, process-lifetime-stable integer id.
/// Two font dictionaries with the same name (the common case for a
/// document's body font repeated across `/Resources` entries in different
/// pages) get the same id without either side needing to know about the
/// other.
pub fn font_pool_id(name: &[u8]) -> u32 {
    let mut pool = FONT_POOL.lock();
    if let Some(&id) = pool.0.get(name) {
        return id;
    }
    let id = pool.1;
    pool.1 += 1;
    pool.0.insert(name.to_vec(), id);
    id
}

/// Reset the font-name pool. Ids already handed out are not retracted; a
/// caller holding one from before `clear()` simply finds it absent from a
/// freshly cleared pool's reverse lookup, which no part of this engine
/// performs (ids are opaque, compared for equality only).
pub fn clear_font_pool() {
    let mut pool = FONT_POOL.lock();
    pool.0.clear();
    pool.1 = 0;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_h_is_horizontal_identity_v_is_vertical() {
        assert_eq!(builtin_cmap_vertical(b"Identity-H"), Some(false));
        assert_eq!(builtin_cmap_vertical(b"Identity-V"), Some(true));
    }

    #[test]
    fn unknown_predefined_name_is_not_builtin() {
        assert_eq!(builtin_cmap_vertical(b"GBK-EUC-H"), None);
    }

    #[test]
    fn font_pool_assigns_stable_ids_to_repeated_names() {
        clear_font_pool();
        let a = font_pool_id(b"Helvetica");
        let b = font_pool_id(b"Times-Roman");
        let a2 = font_pool_id(b"Helvetica");
        assert_eq!(a, a2);
        assert_ne!(a, b);
    }

    #[test]
    fn rune_cache_reuses_the_same_allocation_for_a_code() {
        clear_rune_cache();
        let mut calls = 0;
        let first = intern_rune(65, || {
            calls += 1;
            "A".to_string()
        });
        let second = intern_rune(65, || {
            calls += 1;
            "A".to_string()
        });
        assert_eq!(&*first, "A");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls, 1);
    }
}
