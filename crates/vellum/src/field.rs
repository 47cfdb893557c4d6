use vellum_core::{
    schema::FieldOptions,
    store::WriteValue,
    value::{add_numbers, Number, Value},
    Error, Result,
};

use std::sync::Arc;

/// Per-attribute runtime state.
///
/// Tracks the value observed at load time, the current value, whether the
/// application has read or written the field, and a pending increment
/// accumulator for numeric fields. These flags decide whether the field has
/// mutated and what write expression it emits at commit.
#[derive(Debug)]
pub(crate) struct Field {
    opts: Arc<FieldOptions>,
    /// Value observed in storage at load time; `None` for new documents.
    initial: Option<Value>,
    value: Option<Value>,
    /// The application read the stored value (not merely its own write).
    read_accessed: bool,
    /// The application explicitly assigned a value.
    written: bool,
    /// Pending delta for the store's atomic-increment sentinel.
    accumulator: Option<Number>,
    /// A declared default was silently applied on fetch.
    default_applied: bool,
}

/// How a field comes into being; decides default application.
#[derive(Debug)]
pub(crate) enum FieldInit {
    /// Fresh document; a missing value falls back to the declared default.
    Created { value: Option<Value> },
    /// Fetched from storage; a required, absent field falls back to the
    /// declared default.
    Loaded { stored: Option<Value> },
    /// Blind update: the value counts as explicitly written.
    Written { value: Option<Value> },
    /// Blind update, attribute not mentioned. No defaults, no validation.
    Untouched,
}

impl Field {
    pub(crate) fn new(opts: Arc<FieldOptions>, init: FieldInit) -> Field {
        let mut field = Field {
            opts,
            initial: None,
            value: None,
            read_accessed: false,
            written: false,
            accumulator: None,
            default_applied: false,
        };
        match init {
            FieldInit::Created { value } => {
                field.value = value.or_else(|| field.opts.default().cloned());
            }
            FieldInit::Loaded { stored } => {
                field.initial = stored.clone();
                field.value = stored;
                if field.value.is_none() && !field.opts.is_optional() {
                    if let Some(default) = field.opts.default() {
                        field.value = Some(default.clone());
                        field.default_applied = true;
                    }
                }
            }
            FieldInit::Written { value } => {
                field.value = value;
                field.written = true;
            }
            FieldInit::Untouched => {}
        }
        field
    }

    pub(crate) fn name(&self) -> &str {
        self.opts.name()
    }

    pub(crate) fn options(&self) -> &FieldOptions {
        &self.opts
    }

    /// Current value. Reading a value the application did not itself write
    /// counts as observing stored state, which pins later writes to the
    /// observed value (no atomic increment).
    pub(crate) fn get(&mut self) -> Option<Value> {
        if !self.written {
            self.read_accessed = true;
        }
        self.value.clone()
    }

    /// Current value without touching the access flags. Snapshots use this.
    pub(crate) fn peek(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    pub(crate) fn initial(&self) -> Option<&Value> {
        self.initial.as_ref()
    }

    pub(crate) fn was_written(&self) -> bool {
        self.written
    }

    /// Assigns a value (`None` = absent). On a validation failure the field
    /// is left exactly as it was.
    pub(crate) fn set(&mut self, value: Option<Value>) -> Result<()> {
        if self.opts.is_immutable() && (self.initial.is_some() || self.value.is_some()) {
            return Err(Error::invalid_field(self.name(), "is immutable"));
        }
        self.opts.validate(value.as_ref())?;
        self.value = value;
        self.written = true;
        self.accumulator = None;
        Ok(())
    }

    /// Re-validates the current value.
    pub(crate) fn validate(&self) -> Result<()> {
        self.opts.validate(self.value.as_ref())
    }

    /// Fast path: a field cannot have mutated unless it was read or written,
    /// has a pending increment, or was initialized with a value while its
    /// initial was absent.
    fn may_have_mutated(&self) -> bool {
        self.read_accessed
            || self.written
            || self.accumulator.is_some()
            || (self.initial.is_none() && self.value.is_some())
    }

    /// Whether the current value differs from the initial one. Object and
    /// array values compare structurally.
    pub(crate) fn mutated(&self) -> bool {
        self.may_have_mutated() && self.value != self.initial
    }

    /// Like [`mutated`](Self::mutated), except that the silent application
    /// of a default in a context that will not write is not a change.
    pub(crate) fn has_changes_to_commit(&self, expect_writes: bool) -> bool {
        if !expect_writes && self.default_applied && !self.written && self.accumulator.is_none() {
            return false;
        }
        self.mutated()
    }

    fn can_use_increment(&self) -> bool {
        self.accumulator.is_some()
            && self.initial.is_some()
            && !self.read_accessed
            && !self.written
    }

    /// The driver-side write expression for this field, or `None` when there
    /// is nothing to say about it.
    pub(crate) fn write_value(&self) -> Option<WriteValue> {
        match &self.value {
            None => {
                if self.initial.is_some() || self.written {
                    Some(WriteValue::Remove)
                } else {
                    None
                }
            }
            Some(value) => {
                if self.can_use_increment() {
                    Some(WriteValue::Increment(self.accumulator.clone().unwrap()))
                } else {
                    Some(WriteValue::Set(value.clone()))
                }
            }
        }
    }

    /// Adds `delta` to the field.
    ///
    /// While the stored value has not been observed or overwritten the delta
    /// accumulates and commits as the store's atomic-increment sentinel,
    /// which is safe under concurrent writers. Once the field has been read
    /// or set, the increment degrades to an ordinary read-modify-write.
    pub(crate) fn increment_by(&mut self, delta: Number) -> Result<()> {
        if !self.opts.tag().is_numeric() {
            return Err(Error::invalid_field(
                self.name(),
                format!("cannot increment a {} field", self.opts.tag()),
            ));
        }
        if self.opts.is_immutable() {
            return Err(Error::invalid_field(self.name(), "is immutable"));
        }
        if self.initial.is_none() {
            return Err(Error::invalid_field(
                self.name(),
                "cannot increment a field with no stored value",
            ));
        }

        if self.read_accessed || self.written {
            let current = self
                .value
                .as_ref()
                .and_then(Value::as_number)
                .cloned()
                .ok_or_else(|| Error::invalid_field(self.name(), "current value is not numeric"))?;
            let next = add_numbers(&current, &delta)?;
            tracing::debug!(
                field = self.name(),
                "field was observed; increment degrades to read-modify-write"
            );
            return self.set(Some(Value::Number(next)));
        }

        let accumulator = match &self.accumulator {
            Some(accumulator) => add_numbers(accumulator, &delta)?,
            None => delta,
        };
        let base = self
            .initial
            .as_ref()
            .and_then(Value::as_number)
            .cloned()
            .ok_or_else(|| Error::invalid_field(self.name(), "stored value is not numeric"))?;
        let next = Value::Number(add_numbers(&base, &accumulator)?);
        self.opts.validate(Some(&next))?;

        self.accumulator = Some(accumulator);
        self.value = Some(next);
        Ok(())
    }

    /// Re-baselines after a dispatched write: the written state becomes the
    /// observed state, so only later changes produce another write.
    pub(crate) fn mark_flushed(&mut self) {
        self.initial = self.value.clone();
        self.written = false;
        self.accumulator = None;
        self.default_applied = false;
    }
}
