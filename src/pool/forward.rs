//! Query operations republished on the pool manager
//!
//! Each method is a pass-through into [`PoolManager::execute`]: arguments are
//! cloned per attempt so the call can be replayed on the next active session.

use std::sync::Arc;

use super::error::PoolError;
use super::manager::PoolManager;
use crate::client::types::*;
use crate::client::{QueryClient, QuoteApi};
use crate::source::EndpointSource;

macro_rules! forward_operations {
    ($(
        $(#[$meta:meta])*
        fn $name:ident($($arg:ident: $ty:ty),* $(,)?) -> $ret:ty;
    )*) => {
        impl<C, S> PoolManager<C, S>
        where
            C: QueryClient,
            S: EndpointSource,
        {
            $(
                $(#[$meta])*
                pub async fn $name(&self, $($arg: $ty),*) -> Result<$ret, PoolError> {
                    self.execute(stringify!($name), move |api: Arc<C>| {
                        $(let $arg = $arg.clone();)*
                        async move { api.$name($($arg),*).await }
                    })
                    .await
                }
            )*
        }

        /// Names of every operation forwarded by [`PoolManager`]
        pub const FORWARDED_OPERATIONS: &[&str] = &[$(stringify!($name)),*];
    };
}

crate::client::ops::with_operations!(forward_operations);
