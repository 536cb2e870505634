//! Key construction helpers.
//!
//! Cached values live at `prefix + id`; rebuild locks live at
//! `lock_prefix + TypeName + ":" + id`, so two types cached under the same
//! id never contend for the same lock.

use std::fmt::Display;

/// Builds the store key for `id` under `prefix`.
///
/// # Examples
///
/// ```
/// use cacheguard_core::keys::cache_key;
///
/// assert_eq!(cache_key("cache:shop:", &1), "cache:shop:1");
/// ```
pub fn cache_key<Id: Display + ?Sized>(prefix: &str, id: &Id) -> String {
    format!("{}{}", prefix, id)
}

/// Builds the rebuild-lock key guarding `(T, id)`.
///
/// # Examples
///
/// ```
/// use cacheguard_core::keys::lock_key_for;
///
/// struct Shop;
/// assert_eq!(lock_key_for::<Shop, _>("lock:", &7), "lock:Shop:7");
/// ```
pub fn lock_key_for<T: ?Sized, Id: Display + ?Sized>(lock_prefix: &str, id: &Id) -> String {
    format!("{}{}:{}", lock_prefix, short_type_name::<T>(), id)
}

/// Returns the name of `T` with every module path stripped.
///
/// `alloc::vec::Vec<my_app::ShopType>` becomes `Vec<ShopType>`.
pub fn short_type_name<T: ?Sized>() -> String {
    let full = std::any::type_name::<T>();
    let mut out = String::with_capacity(full.len());
    let mut segment = String::new();

    for ch in full.chars() {
        if ch.is_alphanumeric() || ch == '_' || ch == ':' {
            segment.push(ch);
        } else {
            push_last_segment(&mut out, &segment);
            segment.clear();
            out.push(ch);
        }
    }
    push_last_segment(&mut out, &segment);
    out
}

fn push_last_segment(out: &mut String, path: &str) {
    if let Some(last) = path.rsplit("::").next() {
        out.push_str(last);
    }
}
