//! Schema checks for implementation configuration tables.
//!
//! Every pluggable backend declares the shape of its TOML table through a
//! [`ConfigSchema`]. The service validates each enabled table against it
//! before calling the backend's factory, so factories can assume the keys
//! they read are present and well typed.

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur during configuration validation.
#[derive(Debug, Error)]
pub enum ValidationError {
	#[error("Missing required field: {0}")]
	MissingField(String),
	#[error("Invalid value for field '{field}': {message}")]
	InvalidValue { field: String, message: String },
	#[error("Type mismatch for field '{field}': expected {expected}, got {actual}")]
	TypeMismatch {
		field: String,
		expected: String,
		actual: String,
	},
	#[error("Failed to deserialize config: {0}")]
	DeserializationError(String),
}

impl ValidationError {
	/// Qualifies the field name with its parent table.
	fn nested_in(self, parent: &str) -> Self {
		match self {
			ValidationError::MissingField(f) => ValidationError::MissingField(format!("{}.{}", parent, f)),
			ValidationError::InvalidValue { field, message } => ValidationError::InvalidValue {
				field: format!("{}.{}", parent, field),
				message,
			},
			ValidationError::TypeMismatch {
				field,
				expected,
				actual,
			} => ValidationError::TypeMismatch {
				field: format!("{}.{}", parent, field),
				expected,
				actual,
			},
			other => other,
		}
	}
}

/// Expected type of a configuration value.
#[derive(Debug)]
pub enum FieldType {
	String,
	/// Integer with inclusive bounds.
	Integer { min: Option<i64>, max: Option<i64> },
	Boolean,
	/// `0x`-prefixed 20-byte hex string.
	Address,
	/// `0x`-prefixed 32-byte hex string, such as a program verifying key.
	Bytes32,
	Array(Box<FieldType>),
	Table(Schema),
}

impl FieldType {
	fn name(&self) -> &'static str {
		match self {
			FieldType::String => "string",
			FieldType::Integer { .. } => "integer",
			FieldType::Boolean => "boolean",
			FieldType::Address => "address",
			FieldType::Bytes32 => "bytes32",
			FieldType::Array(_) => "array",
			FieldType::Table(_) => "table",
		}
	}
}

/// Extra check run after the type check passes.
pub type FieldValidator = Box<dyn Fn(&toml::Value) -> Result<(), String> + Send + Sync>;

/// One named entry in a [`Schema`].
pub struct Field {
	pub name: String,
	pub field_type: FieldType,
	pub validator: Option<FieldValidator>,
}

impl std::fmt::Debug for Field {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Field")
			.field("name", &self.name)
			.field("field_type", &self.field_type)
			.field("validator", &self.validator.is_some())
			.finish()
	}
}

impl Field {
	pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
		Self {
			name: name.into(),
			field_type,
			validator: None,
		}
	}

	pub fn with_validator<F>(mut self, validator: F) -> Self
	where
		F: Fn(&toml::Value) -> Result<(), String> + Send + Sync + 'static,
	{
		self.validator = Some(Box::new(validator));
		self
	}

	fn check(&self, value: &toml::Value) -> Result<(), ValidationError> {
		self.field_type.check(&self.name, value)?;
		match &self.validator {
			Some(validator) => validator(value).map_err(|message| invalid(&self.name, message)),
			None => Ok(()),
		}
	}
}

/// Required and optional fields of a TOML table.
#[derive(Debug)]
pub struct Schema {
	pub required: Vec<Field>,
	pub optional: Vec<Field>,
}

impl Schema {
	pub fn new(required: Vec<Field>, optional: Vec<Field>) -> Self {
		Self { required, optional }
	}

	/// Checks presence of required fields, then the type and custom
	/// validator of every field that is present. Nested tables are
	/// validated recursively and report dotted field paths.
	pub fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let table = config
			.as_table()
			.ok_or_else(|| mismatch("root", "table", config))?;

		for field in &self.required {
			match table.get(&field.name) {
				Some(value) => field.check(value)?,
				None => return Err(ValidationError::MissingField(field.name.clone())),
			}
		}
		self.optional
			.iter()
			.filter_map(|field| table.get(&field.name).map(|value| (field, value)))
			.try_for_each(|(field, value)| field.check(value))
	}
}

fn mismatch(field: &str, expected: &str, value: &toml::Value) -> ValidationError {
	ValidationError::TypeMismatch {
		field: field.to_string(),
		expected: expected.to_string(),
		actual: value.type_str().to_string(),
	}
}

fn invalid(field: &str, message: impl Into<String>) -> ValidationError {
	ValidationError::InvalidValue {
		field: field.to_string(),
		message: message.into(),
	}
}

impl FieldType {
	/// Checks `value` at path `field` against this type.
	fn check(&self, field: &str, value: &toml::Value) -> Result<(), ValidationError> {
		let expect = |ok: bool| if ok { Ok(()) } else { Err(mismatch(field, self.name(), value)) };
		match self {
			FieldType::String => expect(value.is_str()),
			FieldType::Boolean => expect(value.is_bool()),
			FieldType::Integer { min, max } => {
				let n = value.as_integer().ok_or_else(|| mismatch(field, self.name(), value))?;
				match (min, max) {
					(Some(lo), _) if n < *lo => Err(invalid(field, format!("Value {} is less than minimum {}", n, lo))),
					(_, Some(hi)) if n > *hi => Err(invalid(field, format!("Value {} is greater than maximum {}", n, hi))),
					_ => Ok(()),
				}
			},
			FieldType::Address => self.check_hex(field, value, 20),
			FieldType::Bytes32 => self.check_hex(field, value, 32),
			FieldType::Array(item_type) => value
				.as_array()
				.ok_or_else(|| mismatch(field, self.name(), value))?
				.iter()
				.enumerate()
				.try_for_each(|(i, item)| item_type.check(&format!("{}[{}]", field, i), item)),
			FieldType::Table(schema) => schema.validate(value).map_err(|e| e.nested_in(field)),
		}
	}

	/// `0x`-prefixed hex of exactly `len` bytes.
	fn check_hex(&self, field: &str, value: &toml::Value, len: usize) -> Result<(), ValidationError> {
		let text = value.as_str().ok_or_else(|| mismatch(field, self.name(), value))?;
		let digits = text
			.strip_prefix("0x")
			.ok_or_else(|| invalid(field, "must start with 0x"))?;
		let decoded = hex::decode(digits).map_err(|e| invalid(field, format!("invalid hex: {}", e)))?;
		if decoded.len() != len {
			return Err(invalid(field, format!("expected {} bytes, got {}", len, decoded.len())));
		}
		Ok(())
	}
}

/// Shape of an implementation's configuration table.
#[async_trait]
pub trait ConfigSchema: Send + Sync {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError>;
}
