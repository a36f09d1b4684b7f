use std::{
    borrow::Cow,
    collections::{HashMap, HashSet},
    convert::{TryFrom, TryInto},
};

use crate::core::color::Color;

/// Typed view over one JSON object describing a closure.
/// Keys that are never read are reported by `check_unused_keys`.
pub struct InputParams {
    params: HashMap<String, InputParamsValue>,
    name: Cow<'static, str>,
    visited_names: HashSet<String>,
}

pub enum InputParamsValue {
    Int(i32),
    Float(f32),
    Bool(bool),
    String(String),
    Array(Vec<InputParamsValue>),
}

impl InputParamsValue {
    fn as_float(&self) -> Option<f32> {
        match self {
            InputParamsValue::Float(value) => Some(*value),
            InputParamsValue::Int(value) => Some(*value as f32),
            _ => None,
        }
    }
}

macro_rules! params_get {
    ( $( ( $name:ident, $type:ty, $convert:expr, $hint:expr ) ),+ $(,)? ) => {
        $(
            paste::paste! {
                #[allow(dead_code)]
                pub fn [<get_ $name>](&mut self, key: &str) -> anyhow::Result<$type> {
                    if let Some(value) = self.params.get(key) {
                        let convert: fn(&InputParamsValue) -> Option<$type> = $convert;
                        if let Some(value) = convert(value) {
                            self.visited_names.insert(key.to_owned());
                            return Ok(value);
                        }
                        anyhow::bail!(format!("{} - '{}' should be {}", self.name, key, $hint));
                    }
                    anyhow::bail!(format!("{} - there is no '{}' field", self.name, key));
                }

                #[allow(dead_code)]
                pub fn [<get_ $name _or>](&mut self, key: &str, fallback: $type) -> anyhow::Result<$type> {
                    if self.params.contains_key(key) {
                        self.[<get_ $name>](key)
                    } else {
                        Ok(fallback)
                    }
                }
            }
        )+
    };
}

macro_rules! params_get_array {
    ( $( ( $name:ident, $type:ty, $convert:expr, $hint:expr ) ),+ $(,)? ) => {
        $(
            paste::paste! {
                pub fn [<get_ $name _array>](
                    &mut self,
                    key: &str,
                    len: Option<usize>,
                ) -> anyhow::Result<Vec<$type>> {
                    if let Some(value) = self.params.get(key) {
                        let error_info = match len {
                            Some(len) => format!(
                                "{} - '{}' should be array with {} {}s",
                                self.name, key, len, $hint
                            ),
                            None => format!("{} - '{}' should be array of {}", self.name, key, $hint),
                        };
                        let convert: fn(&InputParamsValue) -> Option<$type> = $convert;
                        let result = match value {
                            InputParamsValue::Array(arr) if len.map_or(true, |len| arr.len() == len) => {
                                arr.iter().map(convert).collect::<Option<Vec<_>>>()
                            }
                            _ => None,
                        };
                        if let Some(result) = result {
                            self.visited_names.insert(key.to_owned());
                            return Ok(result);
                        }
                        anyhow::bail!(error_info);
                    }
                    anyhow::bail!(format!("{} - there is no '{}' field", self.name, key));
                }

                /// Rows must all have the same length, `len2` when given.
                pub fn [<get_ $name _2darray>](
                    &mut self,
                    key: &str,
                    len1: Option<usize>,
                    len2: Option<usize>,
                ) -> anyhow::Result<Vec<Vec<$type>>> {
                    if let Some(value) = self.params.get(key) {
                        let error_info = format!(
                            "{} - '{}' should be 2D array with {}x{} {}s",
                            self.name,
                            key,
                            len1.map_or("?".to_owned(), |len| len.to_string()),
                            len2.map_or("?".to_owned(), |len| len.to_string()),
                            $hint,
                        );
                        let convert: fn(&InputParamsValue) -> Option<$type> = $convert;
                        let mut result = Vec::new();
                        if let InputParamsValue::Array(arr) = value {
                            if len1.map_or(false, |len1| arr.len() != len1) {
                                anyhow::bail!(error_info);
                            }
                            let mut row_len = len2;
                            for row in arr {
                                let row = match row {
                                    InputParamsValue::Array(row) => row,
                                    _ => anyhow::bail!(error_info),
                                };
                                if *row_len.get_or_insert(row.len()) != row.len() {
                                    anyhow::bail!(error_info);
                                }
                                match row.iter().map(convert).collect::<Option<Vec<_>>>() {
                                    Some(row) => result.push(row),
                                    None => anyhow::bail!(error_info),
                                }
                            }
                            self.visited_names.insert(key.to_owned());
                            return Ok(result);
                        }
                        anyhow::bail!(error_info);
                    }
                    anyhow::bail!(format!("{} - there is no '{}' field", self.name, key));
                }
            }
        )+
    };
}

fn float3_of(value: &InputParamsValue) -> Option<[f32; 3]> {
    if let InputParamsValue::Array(arr) = value {
        if arr.len() == 3 {
            let mut result = [0.0; 3];
            for (dst, ele) in result.iter_mut().zip(arr) {
                *dst = ele.as_float()?;
            }
            return Some(result);
        }
    }
    None
}

impl InputParams {
    pub fn set_name(&mut self, name: Cow<'static, str>) {
        self.name = name;
    }

    pub fn name(&self) -> &str {
        self.name.as_ref()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.params.contains_key(key)
    }

    params_get! {
        (float, f32, InputParamsValue::as_float, "float"),
        (color, Color, |v| float3_of(v).map(Color::from), "RGB array with 3 floats"),
        (vec3, glam::Vec3A, |v| float3_of(v).map(glam::Vec3A::from), "vector with 3 floats"),
    }

    params_get_array! {
        (float, f32, InputParamsValue::as_float, "float"),
    }

    pub fn get_str(&mut self, key: &str) -> anyhow::Result<String> {
        if let Some(value) = self.params.get(key) {
            if let InputParamsValue::String(value) = value {
                self.visited_names.insert(key.to_owned());
                return Ok(value.clone());
            }
            anyhow::bail!(format!("{} - '{}' should be string", self.name, key));
        }
        anyhow::bail!(format!("{} - there is no '{}' field", self.name, key));
    }

    /// Keys starting with `#` are treated as comments.
    pub fn check_unused_keys(&self) {
        let mut unused = self
            .params
            .keys()
            .filter(|k| !k.starts_with('#') && !self.visited_names.contains(*k))
            .collect::<Vec<_>>();
        unused.sort();
        for k in unused {
            log::warn!("{} - unused key '{}'", self.name, k);
        }
    }
}

impl TryFrom<&serde_json::Value> for InputParamsValue {
    type Error = anyhow::Error;

    fn try_from(value: &serde_json::Value) -> Result<Self, Self::Error> {
        match value {
            serde_json::Value::Null => {
                anyhow::bail!("can't convert to InputParamsValue from null json")
            }
            serde_json::Value::Bool(v) => Ok(Self::Bool(*v)),
            serde_json::Value::Number(v) => match (v.as_i64(), v.as_f64()) {
                (Some(v), _) => Ok(Self::Int(v as i32)),
                (None, Some(v)) => Ok(Self::Float(v as f32)),
                _ => anyhow::bail!("can't convert number '{}'", v),
            },
            serde_json::Value::String(v) => Ok(Self::String(v.clone())),
            serde_json::Value::Array(arr) => {
                let mut values = Vec::<InputParamsValue>::with_capacity(arr.len());
                for v in arr {
                    match v.try_into() {
                        Ok(v) => values.push(v),
                        Err(e) => anyhow::bail!(format!("can't convert array element: {}", e)),
                    }
                }
                Ok(Self::Array(values))
            }
            serde_json::Value::Object(_) => {
                anyhow::bail!("can't convert to InputParamsValue from object json")
            }
        }
    }
}

impl TryFrom<&serde_json::Value> for InputParams {
    type Error = anyhow::Error;

    fn try_from(value: &serde_json::Value) -> Result<Self, Self::Error> {
        if let serde_json::Value::Object(value) = value {
            let mut params = HashMap::<String, InputParamsValue>::with_capacity(value.len());
            for (k, v) in value {
                match v.try_into() {
                    Ok(v) => {
                        params.insert(k.clone(), v);
                    }
                    Err(e) => anyhow::bail!(format!("can't convert member '{}': {}", k, e)),
                }
            }
            Ok(Self {
                params,
                name: Cow::Borrowed(""),
                visited_names: HashSet::new(),
            })
        } else {
            anyhow::bail!("can't convert to InputParams from non-object json value");
        }
    }
}
