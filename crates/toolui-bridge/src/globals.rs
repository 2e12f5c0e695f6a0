//! Global state snapshot shared from host to guest.
//!
//! The guest always holds a complete [`Globals`] value. The host pushes a
//! [`GlobalsPatch`] containing only the top-level fields whose JSON value
//! changed; structurally equal values are never re-sent.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::BridgeResult;

/// Changed top-level fields keyed by their camelCase wire name.
pub type GlobalsPatch = Map<String, Value>;

/// Color theme requested by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    /// Light theme
    #[default]
    Light,
    /// Dark theme
    Dark,
}

/// How the guest is presented inside the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    /// Embedded in the conversation flow
    #[default]
    Inline,
    /// Picture-in-picture
    Pip,
    /// Full screen
    Fullscreen,
}

impl DisplayMode {
    /// Wire name of the mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inline => "inline",
            Self::Pip => "pip",
            Self::Fullscreen => "fullscreen",
        }
    }
}

/// Kind of device the host runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    /// Phone
    Mobile,
    /// Tablet
    Tablet,
    /// Desktop or laptop
    #[default]
    Desktop,
    /// Not reported
    Unknown,
}

/// Device description.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Device {
    /// Device kind
    #[serde(rename = "type")]
    pub device_type: DeviceType,
}

/// Input capabilities of the host device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCapabilities {
    /// Pointer hover is available
    pub hover: bool,
    /// Touch input is available
    pub touch: bool,
}

impl Default for DeviceCapabilities {
    fn default() -> Self {
        Self {
            hover: true,
            touch: false,
        }
    }
}

/// What the guest knows about the host's user agent.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UserAgent {
    /// Device description
    pub device: Device,
    /// Input capabilities
    pub capabilities: DeviceCapabilities,
}

/// Insets in pixels.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Insets {
    /// Top inset
    pub top: f64,
    /// Bottom inset
    pub bottom: f64,
    /// Left inset
    pub left: f64,
    /// Right inset
    pub right: f64,
}

/// Area the guest should keep interactive content inside.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SafeArea {
    /// Insets from the viewport edges
    pub insets: Insets,
}

/// Approximate user location, when the host shares one.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UserLocation {
    /// City
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    /// Region or state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Country
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    /// IANA timezone
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    /// Latitude in degrees
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    /// Longitude in degrees
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

/// Metadata returned alongside the tool response.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResponseMetadata {
    /// Session the widget belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub widget_session_id: Option<String>,
    /// The host should close the widget
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close_widget: Option<bool>,
    /// The widget prefers a bordered frame
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefers_border: Option<bool>,
    /// Host-specific extension fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The complete global state visible to the guest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Globals {
    /// Color theme
    pub theme: Theme,
    /// BCP 47 locale
    pub locale: String,
    /// Current display mode
    pub display_mode: DisplayMode,
    /// Display mode before the most recent change
    pub previous_display_mode: Option<DisplayMode>,
    /// Maximum height the guest may occupy, in pixels
    pub max_height: f64,
    /// Arguments the tool was called with
    pub tool_input: Value,
    /// The tool's result
    pub tool_output: Value,
    /// State the guest persisted through `setWidgetState`
    pub widget_state: Value,
    /// Host user agent
    pub user_agent: UserAgent,
    /// Safe area insets
    pub safe_area: SafeArea,
    /// User location
    pub user_location: Option<UserLocation>,
    /// Metadata attached to the tool response
    pub tool_response_metadata: Option<ToolResponseMetadata>,
    /// Host view descriptor
    pub view: Option<Value>,
}

impl Default for Globals {
    fn default() -> Self {
        Self {
            theme: Theme::Light,
            locale: "en-US".to_string(),
            display_mode: DisplayMode::Inline,
            previous_display_mode: None,
            max_height: 800.0,
            tool_input: Value::Object(Map::new()),
            tool_output: Value::Null,
            widget_state: Value::Null,
            user_agent: UserAgent::default(),
            safe_area: SafeArea::default(),
            user_location: None,
            tool_response_metadata: None,
            view: None,
        }
    }
}

impl Globals {
    /// Every field as a wire-named JSON map.
    ///
    /// # Errors
    ///
    /// Fails only if an embedded value cannot be represented as JSON.
    pub fn to_patch(&self) -> BridgeResult<GlobalsPatch> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            _ => Ok(GlobalsPatch::new()),
        }
    }

    /// Overlay `patch` on this snapshot and return the result.
    ///
    /// Fields absent from the patch keep their current value. When the patch
    /// moves `displayMode` without naming `previousDisplayMode`, the old mode
    /// is recorded there.
    ///
    /// # Errors
    ///
    /// Returns [`crate::BridgeError::Serialization`] if a patched field has
    /// the wrong shape.
    pub fn apply_patch(&self, patch: &GlobalsPatch) -> BridgeResult<Self> {
        let mut merged = self.to_patch()?;
        for (key, value) in patch {
            merged.insert(key.clone(), value.clone());
        }
        let mut next: Self = serde_json::from_value(Value::Object(merged))?;
        if next.display_mode != self.display_mode && !patch.contains_key("previousDisplayMode") {
            next.previous_display_mode = Some(self.display_mode);
        }
        Ok(next)
    }

    /// Set `previousDisplayMode` from the prior snapshot.
    ///
    /// It becomes the prior `displayMode` when the mode changed, and keeps
    /// the prior `previousDisplayMode` otherwise.
    pub fn derive_previous_display_mode(&mut self, prior: &Self) {
        self.previous_display_mode = if self.display_mode != prior.display_mode {
            Some(prior.display_mode)
        } else {
            prior.previous_display_mode
        };
    }
}

/// Top-level fields of `next` whose JSON value differs from `prev`.
///
/// Comparison is structural, so maps with the same entries in a different
/// order are equal.
///
/// # Errors
///
/// Fails only if either snapshot cannot be represented as JSON.
pub fn diff(prev: &Globals, next: &Globals) -> BridgeResult<GlobalsPatch> {
    let before = prev.to_patch()?;
    Ok(next
        .to_patch()?
        .into_iter()
        .filter(|(key, value)| before.get(key) != Some(value))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn defaults_match_the_wire_defaults() {
        let patch = Globals::default().to_patch().unwrap();
        assert_eq!(
            Value::Object(patch),
            json!({
                "theme": "light",
                "locale": "en-US",
                "displayMode": "inline",
                "previousDisplayMode": null,
                "maxHeight": 800.0,
                "toolInput": {},
                "toolOutput": null,
                "widgetState": null,
                "userAgent": {
                    "device": {"type": "desktop"},
                    "capabilities": {"hover": true, "touch": false}
                },
                "safeArea": {"insets": {"top": 0.0, "bottom": 0.0, "left": 0.0, "right": 0.0}},
                "userLocation": null,
                "toolResponseMetadata": null,
                "view": null
            })
        );
    }

    #[test]
    fn diff_of_identical_snapshots_is_empty() {
        let globals = Globals::default();
        assert!(diff(&globals, &globals.clone()).unwrap().is_empty());
    }

    #[test]
    fn diff_ignores_key_order_in_nested_objects() {
        let mut a = Globals::default();
        a.tool_output = json!({"a": 1, "b": [1, 2]});
        let mut b = Globals::default();
        b.tool_output = serde_json::from_str(r#"{"b": [1, 2], "a": 1}"#).unwrap();
        assert!(diff(&a, &b).unwrap().is_empty());
    }

    #[test]
    fn diff_reports_only_changed_fields() {
        let prev = Globals::default();
        let mut next = prev.clone();
        next.theme = Theme::Dark;
        next.widget_state = json!({"count": 1});

        let patch = diff(&prev, &next).unwrap();
        assert_eq!(
            Value::Object(patch),
            json!({"theme": "dark", "widgetState": {"count": 1}})
        );
    }

    #[test]
    fn apply_patch_records_previous_display_mode() {
        let current = Globals::default();
        let mut patch = GlobalsPatch::new();
        patch.insert("displayMode".into(), json!("fullscreen"));

        let next = current.apply_patch(&patch).unwrap();
        assert_eq!(next.display_mode, DisplayMode::Fullscreen);
        assert_eq!(next.previous_display_mode, Some(DisplayMode::Inline));
        assert_eq!(next.locale, "en-US");
    }

    #[test]
    fn apply_patch_rejects_wrong_shapes() {
        let mut patch = GlobalsPatch::new();
        patch.insert("theme".into(), json!(42));
        assert!(Globals::default().apply_patch(&patch).is_err());
    }

    #[test]
    fn previous_display_mode_carries_over_when_unchanged() {
        let mut prior = Globals::default();
        prior.display_mode = DisplayMode::Pip;
        prior.previous_display_mode = Some(DisplayMode::Inline);

        let mut next = prior.clone();
        next.previous_display_mode = None;
        next.derive_previous_display_mode(&prior);
        assert_eq!(next.previous_display_mode, Some(DisplayMode::Inline));

        next.display_mode = DisplayMode::Fullscreen;
        next.derive_previous_display_mode(&prior);
        assert_eq!(next.previous_display_mode, Some(DisplayMode::Pip));
    }

    fn arb_globals() -> impl Strategy<Value = Globals> {
        (
            prop_oneof![Just(Theme::Light), Just(Theme::Dark)],
            prop_oneof![
                Just(DisplayMode::Inline),
                Just(DisplayMode::Pip),
                Just(DisplayMode::Fullscreen)
            ],
            "[a-z]{2}-[A-Z]{2}",
            0u32..2000,
            proptest::option::of(0i64..100),
        )
            .prop_map(|(theme, display_mode, locale, max_height, state)| Globals {
                theme,
                display_mode,
                locale,
                max_height: f64::from(max_height),
                widget_state: state.map_or(Value::Null, |n| json!({ "n": n })),
                ..Globals::default()
            })
    }

    proptest! {
        #[test]
        fn applying_the_diff_reproduces_the_target(prev in arb_globals(), next in arb_globals()) {
            let patch = diff(&prev, &next).unwrap();
            let mut rebuilt = prev.to_patch().unwrap();
            for (key, value) in patch {
                rebuilt.insert(key, value);
            }
            prop_assert_eq!(Value::Object(rebuilt), Value::Object(next.to_patch().unwrap()));
        }
    }
}
