//! Input validation for the add-product form.
//!
//! Validation runs before any I/O and reports every failing field at once so a
//! form can render all messages in one pass.

use core::fmt;

use serde::Serialize;

use super::price::Price;

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

/// All field failures for one submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(Vec<FieldError>);

impl ValidationErrors {
    /// Record a failure for `field`.
    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.push(FieldError {
            field,
            message: message.into(),
        });
    }

    /// The first message recorded for `field`, if any.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|e| e.field == field)
            .map(|e| e.message.as_str())
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.0.iter()
    }

    /// `Ok(value)` when nothing was recorded, `Err(self)` otherwise.
    ///
    /// # Errors
    ///
    /// Returns `self` if at least one field failed.
    pub fn into_result<T>(self, value: impl FnOnce() -> T) -> Result<T, Self> {
        if self.is_empty() {
            Ok(value())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for error in &self.0 {
            if !first {
                f.write_str("; ")?;
            }
            first = false;
            write!(f, "{}: {}", error.field, error.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

/// Raw values as typed into the add-product form.
#[derive(Debug, Clone, Default)]
pub struct ProductForm {
    pub name: String,
    pub price: String,
    pub image_uri: Option<String>,
}

/// A form that passed validation, ready to hand to the catalog store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedProduct {
    pub name: String,
    pub price: Price,
    pub image_uri: String,
}

impl ProductForm {
    pub const NAME: &'static str = "name";
    pub const PRICE: &'static str = "price";
    pub const IMAGE: &'static str = "image_uri";

    /// Validate every field.
    ///
    /// # Errors
    ///
    /// Returns all field failures: missing name, missing or non-numeric or
    /// non-positive price, missing image.
    pub fn validate(&self) -> Result<ValidatedProduct, ValidationErrors> {
        let mut errors = ValidationErrors::default();

        let name = self.name.trim();
        if name.is_empty() {
            errors.add(Self::NAME, "Name is required");
        }

        let price = if self.price.trim().is_empty() {
            errors.add(Self::PRICE, "Price is required");
            None
        } else {
            Price::parse(&self.price)
                .map_err(|err| errors.add(Self::PRICE, err.to_string()))
                .ok()
        };

        let image_uri = self
            .image_uri
            .as_deref()
            .map(str::trim)
            .filter(|uri| !uri.is_empty());
        if image_uri.is_none() {
            errors.add(Self::IMAGE, "Image is required");
        }

        match (price, image_uri) {
            (Some(price), Some(image_uri)) if errors.is_empty() => Ok(ValidatedProduct {
                name: name.to_owned(),
                price,
                image_uri: image_uri.to_owned(),
            }),
            _ => Err(errors),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_form() {
        let form = ProductForm {
            name: " Mug ".to_string(),
            price: "9.99".to_string(),
            image_uri: Some("file:///tmp/x.jpg".to_string()),
        };
        let valid = form.validate().unwrap();
        assert_eq!(valid.name, "Mug");
        assert_eq!(valid.price.display(), "$9.99");
        assert_eq!(valid.image_uri, "file:///tmp/x.jpg");
    }

    #[test]
    fn test_empty_form_reports_every_field() {
        let errors = ProductForm::default().validate().unwrap_err();
        assert_eq!(errors.get(ProductForm::NAME), Some("Name is required"));
        assert_eq!(errors.get(ProductForm::PRICE), Some("Price is required"));
        assert_eq!(errors.get(ProductForm::IMAGE), Some("Image is required"));
        assert_eq!(errors.iter().count(), 3);
    }

    #[test]
    fn test_price_messages() {
        let mut form = ProductForm {
            name: "Mug".to_string(),
            price: "ten".to_string(),
            image_uri: Some("x.jpg".to_string()),
        };
        let errors = form.validate().unwrap_err();
        assert_eq!(errors.get(ProductForm::PRICE), Some("Must be a number"));

        form.price = "-2".to_string();
        let errors = form.validate().unwrap_err();
        assert_eq!(
            errors.get(ProductForm::PRICE),
            Some("Price must be greater than zero")
        );
    }

    #[test]
    fn test_display_joins_fields() {
        let mut errors = ValidationErrors::default();
        errors.add("name", "Name is required");
        errors.add("price", "Must be a number");
        assert_eq!(
            errors.to_string(),
            "name: Name is required; price: Must be a number"
        );
    }
}
