//! Backend selection.
//!
//! For a logical format (`text`, `html`, `csv`, or a file extension) the
//! selector resolves one backend name in this order:
//!
//! 1. the backend named in the call's `converter` option, with no fallback;
//! 2. `default_converter`, if it supports the format and is available;
//! 3. the first usable entry of `converter_priority[format]`.
//!
//! A backend is usable when it provides the required [`Capability`], lists
//! the format among its supported formats and reports itself available.
//! Availability is asked for on every selection. External engines search
//! for their binary again while none is found, so one installed after the
//! handle was created is picked up. Handles are cached by the caller.

use crate::backend::{BackendHandle, BackendRegistry, Capability};
use crate::config::Config;
use crate::error::{Error, Result};

/// How a backend was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionSource {
    /// Named in the call's options.
    Explicit,
    /// The configured `default_converter`.
    Default,
    /// An entry of the priority list.
    Priority,
}

/// A chosen backend.
#[derive(Debug, Clone)]
pub struct Selection {
    /// The backend handle.
    pub handle: BackendHandle,
    /// How it was chosen.
    pub source: SelectionSource,
}

impl Selection {
    /// Name of the chosen backend.
    pub fn name(&self) -> &str {
        self.handle.name()
    }
}

/// Resolves backends against one configuration and registry.
#[derive(Debug, Clone, Copy)]
pub struct BackendSelector<'a> {
    config: &'a Config,
    registry: &'a BackendRegistry,
}

impl<'a> BackendSelector<'a> {
    /// Create a selector.
    pub fn new(config: &'a Config, registry: &'a BackendRegistry) -> Self {
        Self { config, registry }
    }

    /// Pick a backend for `format`.
    ///
    /// `resolve` turns a registered name into a handle; an error from it
    /// means the backend cannot be created under the current configuration.
    pub fn select<R>(
        &self,
        format: &str,
        capability: Capability,
        requested: Option<&str>,
        mut resolve: R,
    ) -> Result<Selection>
    where
        R: FnMut(&str) -> Result<BackendHandle>,
    {
        let format = format.to_lowercase();

        if let Some(name) = requested {
            return self
                .explicit(name, &format, capability, &mut resolve)
                .map(|handle| Selection {
                    handle,
                    source: SelectionSource::Explicit,
                });
        }

        if let Some(name) = self.config.default_converter() {
            if let Some(handle) = self.usable(name, &format, capability, &mut resolve) {
                return Ok(Selection {
                    handle,
                    source: SelectionSource::Default,
                });
            }
        }

        for name in self.config.converter_priority(&format) {
            if let Some(handle) = self.usable(&name, &format, capability, &mut resolve) {
                return Ok(Selection {
                    handle,
                    source: SelectionSource::Priority,
                });
            }
        }

        Err(Error::conversion(
            None,
            format!("no available converter for {format}"),
        ))
    }

    fn explicit<R>(
        &self,
        name: &str,
        format: &str,
        capability: Capability,
        resolve: &mut R,
    ) -> Result<BackendHandle>
    where
        R: FnMut(&str) -> Result<BackendHandle>,
    {
        let name = name.to_lowercase();
        if !self.registry.contains(&name) {
            return Err(Error::conversion(
                None,
                format!(
                    "requested converter unavailable: unknown converter '{name}' (known: {})",
                    self.registry.names().join(", ")
                ),
            ));
        }

        let handle = resolve(&name).map_err(|e| Error::not_available(&name, e.to_string()))?;
        if !handle.is_available() {
            let reason = handle
                .unavailable_reason()
                .unwrap_or_else(|| "engine is not installed or cannot be loaded".to_string());
            return Err(Error::not_available(&name, reason));
        }

        if handle.capability() != capability || !handle.supports(format) {
            return Err(Error::conversion(
                Some(name.as_str()),
                format!("requested converter unavailable: {name} does not convert {format}"),
            ));
        }

        Ok(handle)
    }

    fn usable<R>(
        &self,
        name: &str,
        format: &str,
        capability: Capability,
        resolve: &mut R,
    ) -> Option<BackendHandle>
    where
        R: FnMut(&str) -> Result<BackendHandle>,
    {
        if !self.registry.contains(name) {
            log::debug!("Skipping unknown converter '{name}' for {format}");
            return None;
        }

        let handle = match resolve(name) {
            Ok(handle) => handle,
            Err(e) => {
                log::debug!("Skipping converter '{name}': {e}");
                return None;
            }
        };

        let usable =
            handle.capability() == capability && handle.supports(format) && handle.is_available();
        if !usable {
            log::debug!("Converter '{name}' cannot serve {format}");
        }
        usable.then_some(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Backend, BackendContext, PdfOutput, TextBackend};
    use crate::config::Options;
    use crate::sink::MemorySink;
    use serde_json::json;
    use std::path::Path;
    use std::sync::Arc;

    struct Fake {
        name: &'static str,
        available: bool,
    }

    impl Backend for Fake {
        fn name(&self) -> &str {
            self.name
        }

        fn supported_formats(&self) -> Vec<String> {
            vec!["text".into(), "csv".into()]
        }

        fn is_available(&self) -> bool {
            self.available
        }

        fn version(&self) -> Option<String> {
            None
        }
    }

    impl TextBackend for Fake {
        fn convert_text(&self, _: &str, _: Option<&Path>, _: &Options) -> Result<PdfOutput> {
            Ok(PdfOutput::Bytes(b"%PDF".to_vec()))
        }

        fn convert_html(&self, _: &str, _: Option<&Path>, _: &Options) -> Result<PdfOutput> {
            Ok(PdfOutput::Bytes(b"%PDF".to_vec()))
        }

        fn convert_csv(&self, _: &str, _: Option<&Path>, _: &Options) -> Result<PdfOutput> {
            Ok(PdfOutput::Bytes(b"%PDF".to_vec()))
        }
    }

    fn registry() -> BackendRegistry {
        let mut registry = BackendRegistry::new();
        registry.register_fn("a", |_| {
            Ok(BackendHandle::Text(Arc::new(Fake {
                name: "a",
                available: false,
            })))
        });
        registry.register_fn("b", |_| {
            Ok(BackendHandle::Text(Arc::new(Fake {
                name: "b",
                available: true,
            })))
        });
        registry.register_fn("broken", |_| Err(Error::InvalidConfig("no engine".into())));
        registry
    }

    fn resolver(registry: &BackendRegistry) -> impl FnMut(&str) -> Result<BackendHandle> + '_ {
        let ctx = BackendContext {
            section: json!({}),
            sink: Arc::new(MemorySink::new()),
        };
        move |name| match registry.get(name) {
            Some(factory) => factory.create(&ctx),
            None => Err(Error::conversion(None, "unknown")),
        }
    }

    fn config(priority: serde_json::Value) -> Config {
        Config::empty().with("converter_priority", priority)
    }

    #[test]
    fn test_priority_skips_unavailable() {
        let registry = registry();
        let config = config(json!({ "csv": ["a", "b"] }));
        let selector = BackendSelector::new(&config, &registry);

        let chosen = selector
            .select("csv", Capability::Text, None, resolver(&registry))
            .unwrap();
        assert_eq!(chosen.name(), "b");
        assert_eq!(chosen.source, SelectionSource::Priority);
    }

    #[test]
    fn test_explicit_unavailable_does_not_fall_back() {
        let registry = registry();
        let config = config(json!({ "csv": ["a", "b"] }));
        let selector = BackendSelector::new(&config, &registry);

        let err = selector
            .select("csv", Capability::Text, Some("A"), resolver(&registry))
            .unwrap_err();
        assert!(matches!(err, Error::ConverterNotAvailable { ref converter, .. } if converter == "a"));
    }

    #[test]
    fn test_explicit_unknown_and_unsupported() {
        let registry = registry();
        let config = Config::empty();
        let selector = BackendSelector::new(&config, &registry);

        let err = selector
            .select("csv", Capability::Text, Some("zzz"), resolver(&registry))
            .unwrap_err();
        assert!(matches!(err, Error::Conversion { .. }));
        assert!(err.to_string().contains("requested converter unavailable"));

        let err = selector
            .select("html", Capability::Text, Some("b"), resolver(&registry))
            .unwrap_err();
        assert!(err.to_string().contains("requested converter unavailable"));

        let err = selector
            .select("csv", Capability::File, Some("b"), resolver(&registry))
            .unwrap_err();
        assert!(matches!(err, Error::Conversion { .. }));
    }

    #[test]
    fn test_factory_failure_is_not_available() {
        let registry = registry();
        let config = Config::empty();
        let selector = BackendSelector::new(&config, &registry);

        let err = selector
            .select("text", Capability::Text, Some("broken"), resolver(&registry))
            .unwrap_err();
        assert!(matches!(err, Error::ConverterNotAvailable { .. }));
        assert!(err.to_string().contains("no engine"));
    }

    #[test]
    fn test_default_converter_wins_when_usable() {
        let registry = registry();
        let config = config(json!({ "text": ["a", "b"] })).with("default_converter", "b");
        let selector = BackendSelector::new(&config, &registry);

        let chosen = selector
            .select("TEXT", Capability::Text, None, resolver(&registry))
            .unwrap();
        assert_eq!(chosen.name(), "b");
        assert_eq!(chosen.source, SelectionSource::Default);

        // An unusable default falls through to the priority list.
        let config = config.with("default_converter", "a");
        let selector = BackendSelector::new(&config, &registry);
        let chosen = selector
            .select("text", Capability::Text, None, resolver(&registry))
            .unwrap();
        assert_eq!(chosen.source, SelectionSource::Priority);
    }

    #[test]
    fn test_nothing_usable() {
        let registry = registry();
        let config = config(json!({ "csv": ["a", "broken", "missing"] }));
        let selector = BackendSelector::new(&config, &registry);

        let err = selector
            .select("csv", Capability::Text, None, resolver(&registry))
            .unwrap_err();
        assert_eq!(err.to_string(), "no available converter for csv");
    }
}
