//! Observable Parameters
//!
//! A [`Param`] is a typed value cell: one validating setter, a listener list
//! and an optional push into a live control on a processing node. The domain
//! decides what is admissible:
//!
//! - [`Range`]: numeric, clamped to `[min, max]`, NaN rejected
//! - [`Choice`]: one of a fixed list of option strings
//! - [`Toggle`]: boolean
//!
//! Modules hold their parameters type-erased as [`AnyParam`] so they can be
//! addressed by name from the UI, MIDI and presets.

use crate::io::ControlHandle;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use slotmap::SlotMap;
use std::fmt;

/// Smoothing time constant (seconds) used for ramps into live controls
pub const SMOOTHING_TIME_CONSTANT: f64 = 0.01;

slotmap::new_key_type! {
    /// Handle returned by `subscribe`, used to unsubscribe
    pub struct ListenerKey;
}

/// Value domain of a parameter
pub trait Domain: Clone + fmt::Debug {
    type Value: Clone + PartialEq + fmt::Debug;

    /// Validate a candidate. `None` rejects it and the previous value stays.
    fn admit(&self, candidate: Self::Value) -> Option<Self::Value>;

    /// Numeric form written into a live control
    fn encode(&self, value: &Self::Value) -> f64;
}

/// Closed numeric interval
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Range {
    pub fn new(min: f64, max: f64) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    /// Map `0..=1` linearly onto the interval
    pub fn scale(&self, normalized: f64) -> f64 {
        self.min + normalized.clamp(0.0, 1.0) * (self.max - self.min)
    }
}

impl Domain for Range {
    type Value = f64;

    fn admit(&self, candidate: f64) -> Option<f64> {
        if candidate.is_nan() {
            None
        } else {
            Some(candidate.clamp(self.min, self.max))
        }
    }

    fn encode(&self, value: &f64) -> f64 {
        *value
    }
}

/// Fixed set of option strings
#[derive(Debug, Clone, PartialEq)]
pub struct Choice {
    options: &'static [&'static str],
}

impl Choice {
    pub fn new(options: &'static [&'static str]) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &'static [&'static str] {
        self.options
    }

    pub fn index_of(&self, option: &str) -> Option<usize> {
        self.options.iter().position(|o| *o == option)
    }
}

impl Domain for Choice {
    type Value = String;

    fn admit(&self, candidate: String) -> Option<String> {
        self.index_of(&candidate).map(|_| candidate)
    }

    fn encode(&self, value: &String) -> f64 {
        self.index_of(value).unwrap_or(0) as f64
    }
}

/// Boolean switch
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Toggle;

impl Domain for Toggle {
    type Value = bool;

    fn admit(&self, candidate: bool) -> Option<bool> {
        Some(candidate)
    }

    fn encode(&self, value: &bool) -> f64 {
        if *value {
            1.0
        } else {
            0.0
        }
    }
}

type Listener<T> = Box<dyn FnMut(&T)>;

/// An observable, validated value with an optional live binding
pub struct Param<D: Domain> {
    domain: D,
    value: D::Value,
    default: D::Value,
    listeners: SlotMap<ListenerKey, Listener<D::Value>>,
    control: Option<ControlHandle>,
}

impl<D: Domain> Param<D> {
    /// Create a parameter holding its default.
    ///
    /// The default is passed through the domain; an inadmissible default is
    /// a construction bug.
    pub fn new(domain: D, default: D::Value) -> Self {
        let default = match domain.admit(default.clone()) {
            Some(admitted) => admitted,
            None => {
                debug_assert!(false, "default {default:?} outside {domain:?}");
                default
            }
        };
        Self {
            domain,
            value: default.clone(),
            default,
            listeners: SlotMap::with_key(),
            control: None,
        }
    }

    pub fn value(&self) -> &D::Value {
        &self.value
    }

    pub fn default_value(&self) -> &D::Value {
        &self.default
    }

    pub fn domain(&self) -> &D {
        &self.domain
    }

    /// Validate and store a value.
    ///
    /// Returns `true` when the stored value changed. Only then is the bound
    /// control written and every listener called, once each.
    pub fn set(&mut self, candidate: D::Value) -> bool {
        let Some(next) = self.domain.admit(candidate) else {
            return false;
        };
        if next == self.value {
            return false;
        }
        self.value = next;
        if let Some(control) = &self.control {
            control.ramp_to(self.domain.encode(&self.value), SMOOTHING_TIME_CONSTANT);
        }
        for listener in self.listeners.values_mut() {
            listener(&self.value);
        }
        true
    }

    /// Restore the default through [`set`](Self::set)
    pub fn reset(&mut self) -> bool {
        let default = self.default.clone();
        self.set(default)
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&D::Value) + 'static) -> ListenerKey {
        self.listeners.insert(Box::new(listener))
    }

    pub fn unsubscribe(&mut self, key: ListenerKey) -> bool {
        self.listeners.remove(key).is_some()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Attach to a live control, replacing any previous binding, and push
    /// the current value into it immediately
    pub fn bind(&mut self, control: ControlHandle) {
        control.set_immediate(self.domain.encode(&self.value));
        self.control = Some(control);
    }

    pub fn unbind(&mut self) -> Option<ControlHandle> {
        self.control.take()
    }

    pub fn is_bound(&self) -> bool {
        self.control.is_some()
    }
}

impl<D: Domain> fmt::Debug for Param<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Param")
            .field("domain", &self.domain)
            .field("value", &self.value)
            .field("default", &self.default)
            .field("listeners", &self.listeners.len())
            .field("bound", &self.control.is_some())
            .finish()
    }
}

/// A parameter value of any domain.
///
/// Serializes as a bare JSON primitive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Toggle(bool),
    Number(f64),
    Choice(String),
}

impl ParamValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            ParamValue::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Choice(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Toggle(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Number(v)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Toggle(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Choice(v.to_string())
    }
}

/// Type-erased parameter, as stored on a module
#[derive(Debug)]
pub enum AnyParam {
    Number(Param<Range>),
    Choice(Param<Choice>),
    Toggle(Param<Toggle>),
}

impl AnyParam {
    pub fn number(min: f64, max: f64, default: f64) -> Self {
        AnyParam::Number(Param::new(Range::new(min, max), default))
    }

    pub fn choice(options: &'static [&'static str], default: &str) -> Self {
        AnyParam::Choice(Param::new(Choice::new(options), default.to_string()))
    }

    pub fn toggle(default: bool) -> Self {
        AnyParam::Toggle(Param::new(Toggle, default))
    }

    pub fn value(&self) -> ParamValue {
        match self {
            AnyParam::Number(p) => ParamValue::Number(*p.value()),
            AnyParam::Choice(p) => ParamValue::Choice(p.value().clone()),
            AnyParam::Toggle(p) => ParamValue::Toggle(*p.value()),
        }
    }

    pub fn default_value(&self) -> ParamValue {
        match self {
            AnyParam::Number(p) => ParamValue::Number(*p.default_value()),
            AnyParam::Choice(p) => ParamValue::Choice(p.default_value().clone()),
            AnyParam::Toggle(p) => ParamValue::Toggle(*p.default_value()),
        }
    }

    /// Numeric interval, for numeric parameters
    pub fn range(&self) -> Option<Range> {
        match self {
            AnyParam::Number(p) => Some(*p.domain()),
            _ => None,
        }
    }

    /// Store a value of the matching kind; other kinds are rejected
    pub fn set(&mut self, value: ParamValue) -> bool {
        match (self, value) {
            (AnyParam::Number(p), ParamValue::Number(v)) => p.set(v),
            (AnyParam::Choice(p), ParamValue::Choice(v)) => p.set(v),
            (AnyParam::Toggle(p), ParamValue::Toggle(v)) => p.set(v),
            _ => false,
        }
    }

    /// Write a number into any domain.
    ///
    /// Booleans switch on at `0.5`; choices take the option at the rounded
    /// index, clamped to the list.
    pub fn set_number(&mut self, value: f64) -> bool {
        if value.is_nan() {
            return false;
        }
        match self {
            AnyParam::Number(p) => p.set(value),
            AnyParam::Toggle(p) => p.set(value >= 0.5),
            AnyParam::Choice(p) => {
                let options = p.domain().options();
                if options.is_empty() {
                    return false;
                }
                let index = value.round().clamp(0.0, (options.len() - 1) as f64) as usize;
                p.set(options[index].to_string())
            }
        }
    }

    pub fn reset(&mut self) -> bool {
        match self {
            AnyParam::Number(p) => p.reset(),
            AnyParam::Choice(p) => p.reset(),
            AnyParam::Toggle(p) => p.reset(),
        }
    }

    pub fn serialize(&self) -> Value {
        match self {
            AnyParam::Number(p) => Value::from(*p.value()),
            AnyParam::Choice(p) => Value::from(p.value().as_str()),
            AnyParam::Toggle(p) => Value::from(*p.value()),
        }
    }

    /// Restore from a raw JSON primitive through the validating setter.
    ///
    /// A raw value of the wrong shape leaves the parameter unchanged.
    /// Booleans coerce raw truthiness.
    pub fn deserialize(&mut self, raw: &Value) -> bool {
        match self {
            AnyParam::Number(p) => match raw.as_f64() {
                Some(v) => p.set(v),
                None => false,
            },
            AnyParam::Choice(p) => match raw.as_str() {
                Some(s) => p.set(s.to_string()),
                None => false,
            },
            AnyParam::Toggle(p) => p.set(truthy(raw)),
        }
    }

    pub fn subscribe(&mut self, mut listener: impl FnMut(&ParamValue) + 'static) -> ListenerKey {
        match self {
            AnyParam::Number(p) => p.subscribe(move |v| listener(&ParamValue::Number(*v))),
            AnyParam::Choice(p) => p.subscribe(move |v| listener(&ParamValue::Choice(v.clone()))),
            AnyParam::Toggle(p) => p.subscribe(move |v| listener(&ParamValue::Toggle(*v))),
        }
    }

    pub fn unsubscribe(&mut self, key: ListenerKey) -> bool {
        match self {
            AnyParam::Number(p) => p.unsubscribe(key),
            AnyParam::Choice(p) => p.unsubscribe(key),
            AnyParam::Toggle(p) => p.unsubscribe(key),
        }
    }

    pub fn bind(&mut self, control: ControlHandle) {
        match self {
            AnyParam::Number(p) => p.bind(control),
            AnyParam::Choice(p) => p.bind(control),
            AnyParam::Toggle(p) => p.bind(control),
        }
    }

    pub fn unbind(&mut self) -> Option<ControlHandle> {
        match self {
            AnyParam::Number(p) => p.unbind(),
            AnyParam::Choice(p) => p.unbind(),
            AnyParam::Toggle(p) => p.unbind(),
        }
    }

    pub fn is_bound(&self) -> bool {
        match self {
            AnyParam::Number(p) => p.is_bound(),
            AnyParam::Choice(p) => p.is_bound(),
            AnyParam::Toggle(p) => p.is_bound(),
        }
    }
}

fn truthy(raw: &Value) -> bool {
    match raw {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|v| v != 0.0 && !v.is_nan()).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
