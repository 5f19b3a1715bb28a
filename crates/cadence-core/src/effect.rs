//! Effect descriptors and their parameter schemas
//!
//! These are plain data; the DSP that realizes each kind lives in the
//! services crate and reads its settings from here.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EffectId(pub u64);

impl fmt::Display for EffectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectKind {
    Reverb,
    Delay,
    Distortion,
    Chorus,
    Compressor,
    Eq3,
    Filter,
    #[serde(alias = "bitCrusher")]
    BitCrusher,
    Tremolo,
}

impl EffectKind {
    pub const ALL: [EffectKind; 9] = [
        EffectKind::Reverb,
        EffectKind::Delay,
        EffectKind::Distortion,
        EffectKind::Chorus,
        EffectKind::Compressor,
        EffectKind::Eq3,
        EffectKind::Filter,
        EffectKind::BitCrusher,
        EffectKind::Tremolo,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            EffectKind::Reverb => "reverb",
            EffectKind::Delay => "delay",
            EffectKind::Distortion => "distortion",
            EffectKind::Chorus => "chorus",
            EffectKind::Compressor => "compressor",
            EffectKind::Eq3 => "eq3",
            EffectKind::Filter => "filter",
            EffectKind::BitCrusher => "bitcrusher",
            EffectKind::Tremolo => "tremolo",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        let key = key.to_ascii_lowercase();
        Self::ALL.into_iter().find(|k| k.key() == key)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            EffectKind::Reverb => "Reverb",
            EffectKind::Delay => "Delay",
            EffectKind::Distortion => "Distortion",
            EffectKind::Chorus => "Chorus",
            EffectKind::Compressor => "Compressor",
            EffectKind::Eq3 => "3-Band EQ",
            EffectKind::Filter => "Filter",
            EffectKind::BitCrusher => "Bit Crusher",
            EffectKind::Tremolo => "Tremolo",
        }
    }

    /// Parameters this kind understands, with ranges and defaults
    pub fn schema(&self) -> &'static [ParamSpec] {
        match self {
            EffectKind::Reverb => REVERB,
            EffectKind::Delay => DELAY,
            EffectKind::Distortion => DISTORTION,
            EffectKind::Chorus => CHORUS,
            EffectKind::Compressor => COMPRESSOR,
            EffectKind::Eq3 => EQ3,
            EffectKind::Filter => FILTER,
            EffectKind::BitCrusher => BIT_CRUSHER,
            EffectKind::Tremolo => TREMOLO,
        }
    }

    pub fn param_spec(&self, name: &str) -> Option<&'static ParamSpec> {
        self.schema().iter().find(|p| p.name == name)
    }

    pub fn defaults(&self) -> BTreeMap<String, ParamValue> {
        self.schema()
            .iter()
            .map(|p| (p.name.to_string(), p.range.default_value()))
            .collect()
    }
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamRange {
    Number { min: f64, max: f64, default: f64 },
    Choice { choices: &'static [&'static str], default: &'static str },
}

impl ParamRange {
    pub fn default_value(&self) -> ParamValue {
        match self {
            ParamRange::Number { default, .. } => ParamValue::Number(*default),
            ParamRange::Choice { default, .. } => ParamValue::Text((*default).to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub unit: &'static str,
    pub range: ParamRange,
}

const fn number(name: &'static str, unit: &'static str, min: f64, max: f64, default: f64) -> ParamSpec {
    ParamSpec { name, unit, range: ParamRange::Number { min, max, default } }
}

const fn choice(name: &'static str, choices: &'static [&'static str], default: &'static str) -> ParamSpec {
    ParamSpec { name, unit: "", range: ParamRange::Choice { choices, default } }
}

const REVERB: &[ParamSpec] = &[
    number("roomSize", "", 0.0, 1.0, 0.7),
    number("dampening", "Hz", 500.0, 10000.0, 3000.0),
    number("wet", "", 0.0, 1.0, 0.3),
];

const DELAY: &[ParamSpec] = &[
    number("delayTime", "s", 0.01, 1.0, 0.25),
    number("feedback", "", 0.0, 0.95, 0.4),
    number("wet", "", 0.0, 1.0, 0.3),
];

const DISTORTION: &[ParamSpec] = &[
    number("distortion", "", 0.0, 1.0, 0.4),
    number("wet", "", 0.0, 1.0, 1.0),
];

const CHORUS: &[ParamSpec] = &[
    number("frequency", "Hz", 0.1, 10.0, 1.5),
    number("delayTime", "ms", 1.0, 20.0, 3.5),
    number("depth", "", 0.0, 1.0, 0.7),
    number("wet", "", 0.0, 1.0, 0.5),
];

const COMPRESSOR: &[ParamSpec] = &[
    number("threshold", "dB", -60.0, 0.0, -24.0),
    number("ratio", "", 1.0, 20.0, 4.0),
    number("attack", "s", 0.001, 1.0, 0.003),
    number("release", "s", 0.01, 1.0, 0.25),
];

const EQ3: &[ParamSpec] = &[
    number("low", "dB", -24.0, 24.0, 0.0),
    number("mid", "dB", -24.0, 24.0, 0.0),
    number("high", "dB", -24.0, 24.0, 0.0),
    number("lowFrequency", "Hz", 20.0, 1000.0, 400.0),
    number("highFrequency", "Hz", 1000.0, 10000.0, 2500.0),
];

const FILTER: &[ParamSpec] = &[
    number("frequency", "Hz", 20.0, 20000.0, 1000.0),
    number("q", "", 0.1, 10.0, 0.707),
    choice("type", &["lowpass", "highpass", "bandpass"], "lowpass"),
];

const BIT_CRUSHER: &[ParamSpec] = &[
    number("bits", "", 1.0, 16.0, 4.0),
    number("wet", "", 0.0, 1.0, 0.5),
];

const TREMOLO: &[ParamSpec] = &[
    number("frequency", "Hz", 0.1, 40.0, 10.0),
    number("depth", "", 0.0, 1.0, 0.9),
];

/// A parameter value. Most are numbers; a few parameters take a named choice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Flag(bool),
    Number(f64),
    Text(String),
}

impl ParamValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            ParamValue::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ParamValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Number(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

/// An effect in a track's chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Effect {
    /// Zero on a loaded effect means "assign one"
    #[serde(default)]
    pub id: EffectId,
    #[serde(rename = "type")]
    pub kind: EffectKind,
    #[serde(default)]
    pub name: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default)]
    pub parameters: BTreeMap<String, ParamValue>,
}

fn enabled_by_default() -> bool {
    true
}

impl Effect {
    pub fn new(id: EffectId, kind: EffectKind) -> Self {
        Self {
            id,
            kind,
            name: kind.display_name().to_string(),
            enabled: true,
            parameters: kind.defaults(),
        }
    }

    /// Merge parameter updates.
    ///
    /// Unknown names are ignored, numbers are clamped to their range and
    /// choices outside the allowed set are dropped. Returns how many values
    /// actually changed.
    pub fn update(&mut self, updates: &BTreeMap<String, ParamValue>) -> usize {
        let mut changed = 0;
        for (name, value) in updates {
            let Some(spec) = self.kind.param_spec(name) else {
                tracing::debug!(effect = %self.kind, param = %name, "Ignoring unknown parameter");
                continue;
            };
            let accepted = match (&spec.range, value) {
                (ParamRange::Number { min, max, .. }, ParamValue::Number(v)) if v.is_finite() => {
                    Some(ParamValue::Number((*v).clamp(*min, *max)))
                }
                (ParamRange::Choice { choices, .. }, ParamValue::Text(s)) if choices.contains(&s.as_str()) => {
                    Some(value.clone())
                }
                _ => None,
            };
            match accepted {
                Some(v) if self.parameters.get(name) != Some(&v) => {
                    self.parameters.insert(name.clone(), v);
                    changed += 1;
                }
                Some(_) => {}
                None => tracing::debug!(effect = %self.kind, param = %name, "Ignoring invalid value"),
            }
        }
        changed
    }

    /// Rebuild an effect loaded from disk: defaults first, then whatever the file
    /// carried that still fits the schema
    pub fn sanitized(&self) -> Self {
        let mut effect = Effect::new(self.id, self.kind);
        if !self.name.is_empty() {
            effect.name = self.name.clone();
        }
        effect.enabled = self.enabled;
        effect.update(&self.parameters);
        effect
    }

    /// Numeric parameter with schema default fallback
    pub fn number(&self, name: &str) -> f64 {
        if let Some(v) = self.parameters.get(name).and_then(ParamValue::as_number) {
            return v;
        }
        match self.kind.param_spec(name).map(|s| s.range) {
            Some(ParamRange::Number { default, .. }) => default,
            _ => 0.0,
        }
    }

    /// Choice parameter with schema default fallback
    pub fn choice(&self, name: &str) -> &str {
        if let Some(v) = self.parameters.get(name).and_then(ParamValue::as_text) {
            return v;
        }
        match self.kind.param_spec(name).map(|s| s.range) {
            Some(ParamRange::Choice { default, .. }) => default,
            _ => "",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, ParamValue)]) -> BTreeMap<String, ParamValue> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_new_effect_has_defaults() {
        let fx = Effect::new(EffectId(1), EffectKind::Delay);
        assert!(fx.enabled);
        assert_eq!(fx.number("delayTime"), 0.25);
        assert_eq!(fx.number("feedback"), 0.4);
        assert_eq!(fx.number("wet"), 0.3);
    }

    #[test]
    fn test_partial_effect_json() {
        let fx: Effect = serde_json::from_str(r#"{"id": 2, "type": "delay"}"#).unwrap();
        assert_eq!(fx.id, EffectId(2));
        assert!(fx.enabled);
        assert!(fx.name.is_empty());
        let fx = fx.sanitized();
        assert_eq!(fx.name, "Delay");
        assert_eq!(fx.number("delayTime"), 0.25);
    }

    #[test]
    fn test_update_clamps_and_ignores_unknown() {
        let mut fx = Effect::new(EffectId(1), EffectKind::Reverb);
        let changed = fx.update(&params(&[
            ("roomSize", 1.5.into()),
            ("nonsense", 3.0.into()),
            ("wet", 0.3.into()),
        ]));
        assert_eq!(changed, 1);
        assert_eq!(fx.number("roomSize"), 1.0);
        assert!(!fx.parameters.contains_key("nonsense"));
    }

    #[test]
    fn test_update_rejects_bad_choice() {
        let mut fx = Effect::new(EffectId(1), EffectKind::Filter);
        fx.update(&params(&[("type", "notch".into())]));
        assert_eq!(fx.choice("type"), "lowpass");
        fx.update(&params(&[("type", "highpass".into())]));
        assert_eq!(fx.choice("type"), "highpass");
        // wrong value type is ignored
        fx.update(&params(&[("frequency", "loud".into())]));
        assert_eq!(fx.number("frequency"), 1000.0);
    }

    #[test]
    fn test_update_ignores_nan() {
        let mut fx = Effect::new(EffectId(1), EffectKind::Tremolo);
        fx.update(&params(&[("depth", f64::NAN.into())]));
        assert_eq!(fx.number("depth"), 0.9);
    }

    #[test]
    fn test_kind_keys() {
        assert_eq!(EffectKind::from_key("bitCrusher"), Some(EffectKind::BitCrusher));
        assert_eq!(EffectKind::from_key("EQ3"), Some(EffectKind::Eq3));
        assert_eq!(EffectKind::from_key("flanger"), None);
        let json = serde_json::to_string(&EffectKind::BitCrusher).unwrap();
        assert_eq!(json, "\"bitcrusher\"");
    }

    #[test]
    fn test_sanitized_restores_schema() {
        let mut raw = Effect::new(EffectId(4), EffectKind::Compressor);
        raw.parameters.clear();
        raw.parameters.insert("ratio".into(), ParamValue::Number(100.0));
        raw.parameters.insert("legacy".into(), ParamValue::Flag(true));
        raw.enabled = false;
        let fx = raw.sanitized();
        assert!(!fx.enabled);
        assert_eq!(fx.number("ratio"), 20.0);
        assert_eq!(fx.number("threshold"), -24.0);
        assert!(!fx.parameters.contains_key("legacy"));
    }
}
