use std::fmt;
use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer};
use serde::de::{self, Visitor, MapAccess};

// ---------- registers.yaml ----------

// The `block/` + `fieldset/` layout follows [chiptool](https://github.com/embassy-rs/chiptool/blob/main/src/ir.rs)
// with block addresses moved out into peripherals.yaml.
#[derive(Default, Clone, Debug, PartialEq)]
pub struct IR {
    pub blocks: BTreeMap<String, Block>,
    pub fieldsets: BTreeMap<String, FieldSet>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Block {
    #[serde(default)]
    pub description: Option<String>,
    pub items: Vec<BlockItem>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct BlockItem {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub byte_offset: u32,
    #[serde(flatten)]
    pub inner: Register,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Register {
    #[serde(default = "default_readwrite")]
    pub access: Access,
    #[serde(default)]
    pub fieldset: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub enum Access {
    ReadWrite,
    Read,
    Write,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct FieldSet {
    #[serde(default)]
    pub description: Option<String>,
    pub fields: Vec<Field>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub bit_offset: u8,
    pub bit_size: u32,
}

impl Field {
    pub fn mask(&self) -> u32 {
        let ones = if self.bit_size >= 32 {
            u32::MAX
        } else {
            (1u32 << self.bit_size) - 1
        };
        ones << self.bit_offset
    }
}

// ---------- peripherals.yaml ----------

#[derive(Clone, Debug, Deserialize)]
pub struct Peripherals {
    pub m33: Vec<Peripheral>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Peripheral {
    pub name: String,
    pub block: String,
    pub address: u32,
    pub size: u32,
    #[serde(default = "default_readwrite")]
    pub access: Access,
    #[serde(default = "default_absolute")]
    pub addressing: Addressing,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub enum Addressing {
    Absolute,
    Relative,
}

// ---------- interrupts.yaml ----------

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Interrupts {
    pub m33: Vec<Interrupt>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Interrupt {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub value: u32,
}

fn default_readwrite() -> Access {
    Access::ReadWrite
}

fn default_absolute() -> Addressing {
    Addressing::Absolute
}

struct IRVisitor;

impl<'de> Visitor<'de> for IRVisitor {
    type Value = IR;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("an IR")
    }

    fn visit_map<M>(self, mut access: M) -> Result<Self::Value, M::Error>
    where
        M: MapAccess<'de>,
    {
        let mut ir = IR::default();

        while let Some(key) = access.next_key()? {
            let key: String = key;
            let (kind, name) = key.split_once('/').ok_or(de::Error::custom("item names must be in form `kind/name`, where kind is `block` or `fieldset`"))?;
            match kind {
                "block" => {
                    let val: Block = access.next_value()?;
                    if ir.blocks.insert(name.to_string(), val).is_some() {
                        return Err(de::Error::custom(format!("Duplicate item {:?}", key)));
                    }
                }
                "fieldset" => {
                    let val: FieldSet = access.next_value()?;
                    if ir.fieldsets.insert(name.to_string(), val).is_some() {
                        return Err(de::Error::custom(format!("Duplicate item {:?}", key)));
                    }
                }
                _ => return Err(de::Error::custom(format!("Unknown kind {:?}", kind))),
            }
        }

        Ok(ir)
    }
}

impl<'de> Deserialize<'de> for IR {
    fn deserialize<D>(deserializer: D) -> Result<IR, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(IRVisitor)
    }
}
