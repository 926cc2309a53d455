//! Boundary-heavy random field element generation for Cairo entry points.
//!
//! Produces the flat calldata for a function's argument types. Scalars follow a
//! tiered distribution: 50% edge cases (around 0, around 2^128, just below the
//! modulus), 20% below 2^128, 10% in [2^128, P/2), 20% in [P/2, P).

use std::fmt;

use num_bigint::{BigUint, RandBigInt};
use num_traits::One;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tayt_types::{Felt, TypeDescriptor};

use crate::schema::StructTable;

/// Struct/pointer nesting beyond this is treated as a self-referential type.
const MAX_DEPTH: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    /// A struct argument whose name is absent from the struct table.
    UnknownStruct(String),
    /// The modulus leaves no room for the edge-case buckets.
    ModulusTooSmall(BigUint),
    /// Type nesting exceeded the recursion limit.
    TooDeep(String),
    /// Nothing to pick from (no senders or no callable functions).
    EmptyPool(&'static str),
}

impl fmt::Display for GenerationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerationError::UnknownStruct(name) => write!(f, "unknown struct type '{name}'"),
            GenerationError::ModulusTooSmall(m) => {
                write!(f, "modulus {m} is too small, must exceed 2^129 + 2")
            }
            GenerationError::TooDeep(ty) => {
                write!(f, "type '{ty}' nests deeper than {MAX_DEPTH} levels")
            }
            GenerationError::EmptyPool(what) => write!(f, "cannot pick from empty {what}"),
        }
    }
}

impl std::error::Error for GenerationError {}

/// Seeded generator of calldata for ABI argument types.
pub struct ValueGenerator {
    rng: StdRng,
    max_array_len: usize,
    two_pow_128: BigUint,
    modulus: BigUint,
    half_modulus: BigUint,
}

impl ValueGenerator {
    pub fn new(seed: u64, modulus: BigUint, max_array_len: usize) -> Result<Self, GenerationError> {
        let two_pow_128 = BigUint::one() << 128u32;
        let floor = (BigUint::one() << 129u32) + 2u32;
        if modulus <= floor {
            return Err(GenerationError::ModulusTooSmall(modulus));
        }
        Ok(Self {
            rng: StdRng::seed_from_u64(seed),
            max_array_len: max_array_len.max(1),
            half_modulus: &modulus / 2u32,
            two_pow_128,
            modulus,
        })
    }

    /// Shared access to the underlying RNG, so one seed drives the whole run.
    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// Flat calldata for `types`, in argument order.
    pub fn generate(
        &mut self,
        types: &[TypeDescriptor],
        structs: &StructTable,
    ) -> Result<Vec<Felt>, GenerationError> {
        let mut out = Vec::new();
        for ty in types {
            self.generate_into(ty, structs, 0, &mut out)?;
        }
        Ok(out)
    }

    fn generate_into(
        &mut self,
        ty: &TypeDescriptor,
        structs: &StructTable,
        depth: usize,
        out: &mut Vec<Felt>,
    ) -> Result<(), GenerationError> {
        if depth > MAX_DEPTH {
            return Err(GenerationError::TooDeep(ty.to_string()));
        }
        match ty {
            TypeDescriptor::Felt => out.push(self.gen_felt()),
            TypeDescriptor::Pointer(pointee) => {
                let len = self.rng.gen_range(1..=self.max_array_len);
                out.push(Felt::from(len as u64));
                for _ in 0..len {
                    self.generate_into(pointee, structs, depth + 1, out)?;
                }
            }
            TypeDescriptor::Tuple(members) => {
                for member in members {
                    self.generate_into(member, structs, depth + 1, out)?;
                }
            }
            TypeDescriptor::Struct(name) => {
                let members = structs
                    .get(name)
                    .ok_or_else(|| GenerationError::UnknownStruct(name.clone()))?;
                for member in members {
                    self.generate_into(member, structs, depth + 1, out)?;
                }
            }
        }
        Ok(())
    }

    /// One scalar in `[0, modulus)`.
    pub fn gen_felt(&mut self) -> Felt {
        let tier: f64 = self.rng.gen();
        let value = if tier < 0.5 {
            // Edge cases, each bucket equally likely
            match self.rng.gen_range(0..3) {
                0 => BigUint::from(self.rng.gen_range(0u32..=2)),
                1 => &self.two_pow_128 - 1u32 + self.rng.gen_range(0u32..=2),
                _ => &self.modulus - 3u32 + self.rng.gen_range(0u32..=2),
            }
        } else if tier < 0.7 {
            self.rng.gen_biguint_below(&self.two_pow_128)
        } else if tier < 0.8 {
            self.rng
                .gen_biguint_range(&self.two_pow_128, &self.half_modulus)
        } else {
            self.rng
                .gen_biguint_range(&self.half_modulus, &self.modulus)
        };
        Felt::new(value)
    }

    /// Uniform value in the inclusive range `[low, high]`.
    pub fn gen_in_range(&mut self, low: &BigUint, high: &BigUint) -> Felt {
        if low >= high {
            return Felt::new(low.clone());
        }
        Felt::new(self.rng.gen_biguint_range(low, &(high + 1u32)))
    }
}
