//! Small `Option`/`HashMap` convenience extensions used internally to turn
//! "this should never happen" lookups into `anyhow::Error` instead of a
//! panic, so that an invariant violation deep in the lineage graph surfaces
//! as a diagnosable error rather than aborting the process.

use std::{borrow::Borrow, collections::HashMap, hash::Hash};

/// Generates a `pub(crate)` trait (default visibility) adding a
/// `Option<T> -> Result<T, anyhow::Error>` conversion method, raising
/// `$err_expr` on `None`.
///
/// ```ignore
/// impl_option_handle_trait!(TrackOption, ok_or_missing_track, anyhow!("track missing"));
/// ```
macro_rules! impl_option_handle_trait {
    ($trait_name:ident, $method_name:ident, $err_expr:expr) => {
        impl_option_handle_trait!(pub(crate), $trait_name, $method_name, $err_expr);
    };
    ($vis:vis, $trait_name:ident, $method_name:ident, $err_expr:expr) => {
        $vis trait $trait_name<T> {
            fn $method_name(self) -> Result<T, anyhow::Error>;
        }

        impl<T> $trait_name<T> for Option<T> {
            fn $method_name(self) -> Result<T, anyhow::Error> {
                match self {
                    Some(v) => Ok(v),
                    None => Err($err_expr),
                }
            }
        }
    };
}

pub(crate) use impl_option_handle_trait;

impl_option_handle_trait!(
    TrackSlotOption,
    ok_or_missing_track,
    anyhow::anyhow!("track arena slot was empty or already removed")
);

pub(crate) trait HashMapExt<K, V> {
    fn get_or_keyerr<Q>(&self, k: &Q) -> Result<&V, anyhow::Error>
    where
        K: Borrow<Q>,
        Q: std::fmt::Display + Hash + Eq + ?Sized;
}

impl<K, V, S> HashMapExt<K, V> for HashMap<K, V, S>
where
    K: Hash + Eq,
    S: std::hash::BuildHasher,
{
    fn get_or_keyerr<Q>(&self, k: &Q) -> Result<&V, anyhow::Error>
    where
        K: Borrow<Q>,
        Q: std::fmt::Display + Hash + Eq + ?Sized,
    {
        match self.get(k) {
            Some(v) => Ok(v),
            None => Err(anyhow::anyhow!("key {} not found", k)),
        }
    }
}
