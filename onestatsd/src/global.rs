use once_cell::sync::OnceCell;

use crate::{OneStatsd, OneStatsdBuilder};

static GLOBAL: OnceCell<OneStatsd> = OnceCell::new();

/// Returns the global client.
///
/// If no client was installed with [`OneStatsdBuilder::install`], a client with the default configuration is created on
/// first use. Like any other client, it does not connect until the first metric is sent.
///
/// ```no_run
/// onestatsd::global().increment("page.views", 1, &[], 1.0);
/// ```
pub fn global() -> &'static OneStatsd {
    GLOBAL.get_or_init(|| OneStatsdBuilder::default().build())
}

pub(crate) fn install(client: OneStatsd) -> Result<(), OneStatsd> {
    GLOBAL.set(client)
}
