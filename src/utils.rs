// This file is part of the terraform-provider-dbtcloud project
//
// Copyright (C) ANEO, 2024-2024. All rights reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License")
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::borrow::Cow;
use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};

use anyhow::{anyhow, Result};
use tf_provider::schema::{
    Attribute, AttributeConstraint, AttributeType, Block, Description, Schema,
};
use tf_provider::value::{Value, ValueBool, ValueList, ValueNumber, ValueSet, ValueString};
use tf_provider::{AttributePath, Diagnostics};

/// Build an attribute of the given type
pub(crate) fn attribute(
    attr_type: AttributeType,
    constraint: AttributeConstraint,
    description: &str,
) -> Attribute {
    Attribute {
        attr_type,
        description: Description::plain(description),
        constraint,
        ..Default::default()
    }
}

pub(crate) fn sensitive(attr: Attribute) -> Attribute {
    Attribute {
        sensitive: true,
        ..attr
    }
}

pub(crate) fn string_list() -> AttributeType {
    AttributeType::List(AttributeType::String.into())
}

pub(crate) fn number_list() -> AttributeType {
    AttributeType::List(AttributeType::Number.into())
}

pub(crate) fn number_set() -> AttributeType {
    AttributeType::Set(AttributeType::Number.into())
}

pub(crate) fn schema(description: &str, attributes: HashMap<String, Attribute>) -> Schema {
    Schema {
        version: 1,
        block: Block {
            version: 1,
            description: Description::markdown(description),
            attributes,
            ..Default::default()
        },
    }
}

/// Known string as an owned `String`
pub(crate) fn opt_str(value: &ValueString<'_>) -> Option<String> {
    value.as_deref_option().map(ToOwned::to_owned)
}

pub(crate) fn req_str(value: &ValueString<'_>, name: &str) -> Result<String> {
    opt_str(value).ok_or_else(|| anyhow!("`{name}` must be known"))
}

pub(crate) fn opt_num(value: &ValueNumber) -> Option<i64> {
    value.as_ref_option().copied()
}

pub(crate) fn req_num(value: &ValueNumber, name: &str) -> Result<i64> {
    opt_num(value).ok_or_else(|| anyhow!("`{name}` must be known"))
}

pub(crate) fn bool_or(value: &ValueBool, default: bool) -> bool {
    value.as_ref_option().copied().unwrap_or(default)
}

pub(crate) fn str_value<'a>(value: impl Into<String>) -> ValueString<'a> {
    Value::Value(Cow::Owned(value.into()))
}

pub(crate) fn opt_str_value<'a>(value: Option<String>) -> ValueString<'a> {
    value.map(Cow::Owned).into()
}

/// Empty strings returned by the API are nulls in Terraform
pub(crate) fn non_empty_value<'a>(value: Option<String>) -> ValueString<'a> {
    opt_str_value(value.filter(|s| !s.is_empty()))
}

pub(crate) fn str_list(value: &ValueList<ValueString<'_>>) -> Vec<String> {
    value.iter().flatten().filter_map(opt_str).collect()
}

pub(crate) fn num_list(value: &ValueList<ValueNumber>) -> Vec<i64> {
    value.iter().flatten().filter_map(opt_num).collect()
}

pub(crate) fn num_set(value: &ValueSet<ValueNumber>) -> Vec<i64> {
    value.iter().flatten().filter_map(opt_num).collect()
}

pub(crate) fn str_list_value<'a>(values: Vec<String>) -> ValueList<ValueString<'a>> {
    Value::Value(values.into_iter().map(str_value).collect())
}

pub(crate) fn num_list_value(values: Vec<i64>) -> ValueList<ValueNumber> {
    Value::Value(values.into_iter().map(Value::Value).collect())
}

pub(crate) fn num_set_value(values: impl IntoIterator<Item = i64>) -> ValueSet<ValueNumber> {
    Value::Value(values.into_iter().map(Value::Value).collect::<BTreeSet<_>>())
}

/// Fill an optional attribute with its default value
pub(crate) fn default_to<T>(value: &mut Value<T>, default: T) {
    if value.is_null() {
        *value = Value::Value(default);
    }
}

/// Mark a computed attribute as known only after apply
pub(crate) fn computed<T>(value: &mut Value<T>) {
    if value.is_null() {
        *value = Value::Unknown;
    }
}

pub(crate) fn replace_on_change<T: PartialEq>(
    paths: &mut Vec<AttributePath>,
    name: &'static str,
    prior: &Value<T>,
    proposed: &Value<T>,
) {
    if prior != proposed {
        paths.push(AttributePath::new(name));
    }
}

pub(crate) fn validate_one_of(
    diags: &mut Diagnostics,
    attr_path: AttributePath,
    value: &ValueString<'_>,
    allowed: &[&str],
) {
    if let Value::Value(value) = value {
        if !allowed.contains(&&**value) {
            diags.error(
                "Invalid attribute value",
                format!(
                    "`{value}` is not one of: {}",
                    allowed.iter().join_with(", ")
                ),
                attr_path,
            );
        }
    }
}

/// A known condition requires the attribute to be set
pub(crate) fn validate_required_if<T>(
    diags: &mut Diagnostics,
    name: &'static str,
    value: &Value<T>,
    condition: bool,
    reason: &str,
) {
    if condition && value.is_null() {
        diags.error(
            format!("Missing `{name}`"),
            format!("`{name}` is required when {reason}"),
            AttributePath::new(name),
        );
    }
}

/// A known condition forbids the attribute
pub(crate) fn validate_conflicts_if<T>(
    diags: &mut Diagnostics,
    name: &'static str,
    value: &Value<T>,
    condition: bool,
    reason: &str,
) {
    if condition && value.is_value() {
        diags.error(
            format!("Unexpected `{name}`"),
            format!("`{name}` cannot be set when {reason}"),
            AttributePath::new(name),
        );
    }
}

/// Lazily joined items, formatted without an intermediate `Vec<String>`
///
/// Renders allowed values in diagnostics, composite ids and cron fields.
pub struct DisplayJoiner<'a, T, I>
where
    T: Iterator<Item = I>,
    I: std::fmt::Display,
{
    iter: RefCell<T>,
    sep: &'a str,
}

/// `join_with` on any iterator of displayable items
pub trait DisplayJoinable {
    type Joiner<'a>;
    fn join_with(self, sep: &str) -> Self::Joiner<'_>;
}

impl<T, I> DisplayJoinable for T
where
    T: Iterator<Item = I>,
    I: std::fmt::Display,
{
    type Joiner<'a> = DisplayJoiner<'a, T, I>;

    fn join_with(self, sep: &str) -> Self::Joiner<'_> {
        DisplayJoiner {
            iter: RefCell::new(self),
            sep,
        }
    }
}

impl<'a, T, I> std::fmt::Display for DisplayJoiner<'a, T, I>
where
    T: Iterator<Item = I>,
    I: std::fmt::Display,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut sep = "";
        let mut iter = self.iter.try_borrow_mut().or(Err(std::fmt::Error))?;
        for elt in iter.by_ref() {
            f.write_str(sep)?;
            f.write_fmt(format_args!("{elt}"))?;
            sep = self.sep;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_with_separator() {
        assert_eq!([1, 2, 3].iter().join_with(",").to_string(), "1,2,3");
        assert_eq!(Vec::<i64>::new().iter().join_with(",").to_string(), "");
    }

    #[test]
    fn defaults_only_fill_nulls() {
        let mut value = ValueNumber::Null;
        default_to(&mut value, 4);
        assert_eq!(value, Value::Value(4));

        let mut value = ValueNumber::Unknown;
        default_to(&mut value, 4);
        assert!(value.is_unknown());

        let mut value = ValueNumber::Value(2);
        computed(&mut value);
        assert_eq!(value, Value::Value(2));
    }

    #[test]
    fn one_of_ignores_unknowns() {
        let mut diags = Diagnostics::default();
        validate_one_of(
            &mut diags,
            AttributePath::new("type"),
            &ValueString::Unknown,
            &["a"],
        );
        validate_one_of(&mut diags, AttributePath::new("type"), &str_value("a"), &["a"]);
        assert!(diags.errors.is_empty());

        validate_one_of(&mut diags, AttributePath::new("type"), &str_value("b"), &["a"]);
        assert_eq!(diags.errors.len(), 1);
    }

    #[test]
    fn empty_strings_become_null() {
        assert!(non_empty_value(Some(String::new())).is_null());
        assert_eq!(non_empty_value(Some("x".into())), str_value("x"));
    }
}
