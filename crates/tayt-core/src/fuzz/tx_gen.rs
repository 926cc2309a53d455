//! Random transaction generation: sender, entry point, calldata, nonce.

use num_bigint::BigUint;
use num_traits::One;
use rand::seq::SliceRandom;
use tayt_types::Felt;

use super::value_gen::{GenerationError, ValueGenerator};
use crate::execution::EntryPointType;
use crate::schema::{CallableFunction, StructTable};

/// One generated call, not yet executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuzzedCall {
    pub sender: Felt,
    pub function: String,
    pub arguments: Vec<Felt>,
    pub kind: EntryPointType,
    /// Set for message-handler calls only.
    pub nonce: Option<Felt>,
}

/// Default nonce range for message-handler calls, `[2^128, 2^250]`.
pub fn default_nonce_range() -> (BigUint, BigUint) {
    (BigUint::one() << 128u32, BigUint::one() << 250u32)
}

pub struct TxGenerator {
    values: ValueGenerator,
    senders: Vec<Felt>,
    nonce_range: (BigUint, BigUint),
}

impl TxGenerator {
    pub fn new(
        values: ValueGenerator,
        senders: Vec<Felt>,
        nonce_range: (BigUint, BigUint),
    ) -> Result<Self, GenerationError> {
        if senders.is_empty() {
            return Err(GenerationError::EmptyPool("sender pool"));
        }
        Ok(Self {
            values,
            senders,
            nonce_range,
        })
    }

    /// Pick a sender and a function uniformly, then generate its calldata.
    pub fn generate_fuzzed_tx(
        &mut self,
        functions: &[CallableFunction],
        structs: &StructTable,
    ) -> Result<FuzzedCall, GenerationError> {
        let sender = self
            .senders
            .choose(self.values.rng())
            .cloned()
            .ok_or(GenerationError::EmptyPool("sender pool"))?;
        let function = functions
            .choose(self.values.rng())
            .ok_or(GenerationError::EmptyPool("function list"))?;

        let arguments = self.values.generate(&function.arguments, structs)?;
        let kind = function.entry_point_type();
        let nonce = match kind {
            EntryPointType::L1Handler => {
                let (low, high) = &self.nonce_range;
                Some(self.values.gen_in_range(low, high))
            }
            _ => None,
        };

        Ok(FuzzedCall {
            sender,
            function: function.name.clone(),
            arguments,
            kind,
            nonce,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FunctionKind;
    use tayt_types::{field_prime, TypeDescriptor};

    fn tx_gen(seed: u64, senders: Vec<Felt>) -> TxGenerator {
        let values = ValueGenerator::new(seed, field_prime(), 10).unwrap();
        TxGenerator::new(values, senders, default_nonce_range()).unwrap()
    }

    fn function(name: &str, kind: FunctionKind, arguments: Vec<TypeDescriptor>) -> CallableFunction {
        CallableFunction {
            name: name.to_string(),
            arguments,
            kind,
        }
    }

    #[test]
    fn test_message_handler_gets_nonce_in_range() {
        let mut gen = tx_gen(1, vec![Felt::from(0u64)]);
        let functions = vec![function(
            "deposit",
            FunctionKind::MessageHandler,
            vec![TypeDescriptor::Felt],
        )];
        let (low, high) = default_nonce_range();
        for _ in 0..50 {
            let tx = gen
                .generate_fuzzed_tx(&functions, &StructTable::new())
                .unwrap();
            assert_eq!(tx.kind, EntryPointType::L1Handler);
            let nonce = tx.nonce.unwrap().into_biguint();
            assert!(nonce >= low && nonce <= high);
        }
    }

    #[test]
    fn test_external_call_has_no_nonce_and_known_sender() {
        let senders = vec![Felt::from(5u64), Felt::from(6u64)];
        let mut gen = tx_gen(2, senders.clone());
        let functions = vec![
            function("a", FunctionKind::Mutating, vec![]),
            function("b", FunctionKind::Mutating, vec![TypeDescriptor::Felt]),
        ];
        for _ in 0..50 {
            let tx = gen
                .generate_fuzzed_tx(&functions, &StructTable::new())
                .unwrap();
            assert!(tx.nonce.is_none());
            assert!(senders.contains(&tx.sender));
            let expected_args = if tx.function == "a" { 0 } else { 1 };
            assert_eq!(tx.arguments.len(), expected_args);
        }
    }

    #[test]
    fn test_empty_pools_rejected() {
        let values = ValueGenerator::new(0, field_prime(), 10).unwrap();
        assert!(TxGenerator::new(values, vec![], default_nonce_range()).is_err());

        let mut gen = tx_gen(0, vec![Felt::from(1u64)]);
        assert_eq!(
            gen.generate_fuzzed_tx(&[], &StructTable::new()).unwrap_err(),
            GenerationError::EmptyPool("function list")
        );
    }
}
