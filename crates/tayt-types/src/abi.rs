//! Cairo contract ABI entries.

use num_bigint::BigUint;
use num_traits::One;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

use crate::felt::Felt;

/// One entry of a compiled contract's ABI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AbiEntry {
    Constructor(FunctionAbi),
    Function(FunctionAbi),
    L1Handler(FunctionAbi),
    Struct(StructAbi),
    Event(EventAbi),
    /// Entry kinds the fuzzer has no use for.
    #[serde(other)]
    Other,
}

impl AbiEntry {
    pub fn name(&self) -> Option<&str> {
        match self {
            AbiEntry::Constructor(f) | AbiEntry::Function(f) | AbiEntry::L1Handler(f) => {
                Some(&f.name)
            }
            AbiEntry::Struct(s) => Some(&s.name),
            AbiEntry::Event(e) => Some(&e.name),
            AbiEntry::Other => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionAbi {
    pub name: String,
    #[serde(default)]
    pub inputs: Vec<AbiMember>,
    #[serde(default)]
    pub outputs: Vec<AbiMember>,
    #[serde(
        rename = "stateMutability",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub state_mutability: Option<String>,
}

impl FunctionAbi {
    pub fn is_view(&self) -> bool {
        self.state_mutability.as_deref() == Some("view")
    }
}

/// A named, typed slot: function input/output, struct member or event field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbiMember {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructAbi {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default)]
    pub members: Vec<AbiMember>,
}

impl StructAbi {
    /// Members in memory order (by offset when the ABI provides one).
    pub fn ordered_members(&self) -> Vec<&AbiMember> {
        let mut members: Vec<&AbiMember> = self.members.iter().collect();
        members.sort_by_key(|m| m.offset.unwrap_or(u64::MAX));
        members
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventAbi {
    pub name: String,
    #[serde(default)]
    pub keys: Vec<AbiMember>,
    #[serde(default)]
    pub data: Vec<AbiMember>,
}

/// StarkNet selector of an entry point or event: keccak256 truncated to 250 bits.
pub fn selector_from_name(name: &str) -> Felt {
    let digest = Keccak256::digest(name.as_bytes());
    let mask = (BigUint::one() << 250u32) - BigUint::one();
    Felt::new(BigUint::from_bytes_be(&digest) & mask)
}
