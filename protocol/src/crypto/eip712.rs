//! # Typed-Data Digests (EIP-712)
//!
//! Builds the digest a counterparty signs when proposing loan terms.
//!
//! ```text
//! digest = keccak256(0x19 ‖ 0x01 ‖ domainSeparator ‖ hashStruct(message))
//! ```
//!
//! Two message shapes exist and they must never be confused:
//!
//! - **LoanTerms** binds one specific collateral token via `collateralId`.
//! - **LoanTermsWithItems** replaces `collateralId` with `itemsHash`, the hash
//!   of a predicate list. One signature then authorizes *any* collateral
//!   container that satisfies the predicates.
//!
//! The two type strings differ, so their type hashes differ, so identical
//! terms never produce the same digest across shapes.
//!
//! ## Layout
//!
//! This is the version-3 layout: no installment fields, side and nonce
//! properties hashed into the message, affiliate code signed. Changing a
//! single character of the type strings below orphans every outstanding
//! signature, so bump [`crate::config::DEFAULT_DOMAIN_VERSION`] along with it.

use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};

use super::hash::{keccak256, keccak256_multi, WordEncoder};
use crate::config::DomainConfig;
use crate::loan::types::{LoanTerms, Predicate, Side, SigProperties};

/// Domain type string.
pub const EIP712_DOMAIN_TYPE: &str =
    "EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)";

/// Nested replay-control struct.
pub const SIG_PROPERTIES_TYPE: &str = "SigProperties(uint256 nonce,uint256 maxUses)";

/// Plain loan-terms message. Referenced struct types are appended in
/// alphabetical order, as EIP-712 requires.
pub const LOAN_TERMS_TYPE: &str = "LoanTerms(uint256 durationSecs,uint256 deadline,uint256 interestRate,uint256 principal,address collateralAddress,uint256 collateralId,address payableCurrency,bytes32 affiliateCode,SigProperties sigProperties,uint8 side)SigProperties(uint256 nonce,uint256 maxUses)";

/// Items loan-terms message.
pub const LOAN_TERMS_WITH_ITEMS_TYPE: &str = "LoanTermsWithItems(uint256 durationSecs,uint256 deadline,uint256 interestRate,uint256 principal,address collateralAddress,bytes32 itemsHash,address payableCurrency,bytes32 affiliateCode,SigProperties sigProperties,uint8 side)SigProperties(uint256 nonce,uint256 maxUses)";

/// A single collateral predicate.
pub const PREDICATE_TYPE: &str = "Predicate(bytes data,address verifier)";

/// The two digest shapes a proposal can be signed under.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestShape {
    /// Terms bound to one collateral id.
    Plain,
    /// Terms bound to a predicate list.
    Items,
}

/// `keccak256(typeString)` for each struct, computed once.
fn type_hash(type_string: &str) -> B256 {
    keccak256(type_string.as_bytes())
}

/// Hash of the signature properties struct.
pub fn hash_sig_properties(props: &SigProperties) -> B256 {
    WordEncoder::with_capacity(3)
        .word(type_hash(SIG_PROPERTIES_TYPE))
        .uint(props.nonce)
        .uint64(props.max_uses)
        .finish()
}

/// Hash of a single predicate struct.
pub fn hash_predicate(predicate: &Predicate) -> B256 {
    WordEncoder::with_capacity(3)
        .word(type_hash(PREDICATE_TYPE))
        .word(keccak256(&predicate.data))
        .address(predicate.verifier)
        .finish()
}

/// Hash of a predicate array: `keccak256(hashStruct(p0) ‖ hashStruct(p1) ‖ ...)`.
///
/// Order matters. An empty list hashes to `keccak256("")`, which is a valid
/// value to sign but will never pass the predicate checker.
pub fn items_hash(predicates: &[Predicate]) -> B256 {
    let hashes: Vec<B256> = predicates.iter().map(hash_predicate).collect();
    let parts: Vec<&[u8]> = hashes.iter().map(|h| h.as_slice()).collect();
    keccak256_multi(&parts)
}

/// Final EIP-712 envelope around a struct hash.
pub fn hash_typed_data(domain_separator: B256, struct_hash: B256) -> B256 {
    keccak256_multi(&[
        &[0x19u8, 0x01][..],
        domain_separator.as_slice(),
        struct_hash.as_slice(),
    ])
}

/// A deployment's signing domain, with its separator precomputed.
///
/// Cheap to clone and carries no mutable state, so every digest it produces
/// is a pure function of its inputs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypedDataDomain {
    config: DomainConfig,
    separator: B256,
}

impl TypedDataDomain {
    /// Build a domain and compute its separator.
    pub fn new(config: DomainConfig) -> Self {
        let separator = WordEncoder::with_capacity(5)
            .word(type_hash(EIP712_DOMAIN_TYPE))
            .word(keccak256(config.name.as_bytes()))
            .word(keccak256(config.version.as_bytes()))
            .uint(U256::from(config.chain_id))
            .address(config.verifying_contract)
            .finish();
        Self { config, separator }
    }

    /// The domain separator.
    pub fn separator(&self) -> B256 {
        self.separator
    }

    /// The configuration this domain was built from.
    pub fn config(&self) -> &DomainConfig {
        &self.config
    }

    /// Address bound into the domain.
    pub fn verifying_contract(&self) -> Address {
        self.config.verifying_contract
    }

    /// Digest for a plain proposal.
    pub fn loan_terms_digest(&self, terms: &LoanTerms, props: &SigProperties, side: Side) -> B256 {
        let struct_hash = encode_terms(
            LOAN_TERMS_TYPE,
            terms,
            CollateralBinding::Id(terms.collateral_id),
            props,
            side,
        );
        hash_typed_data(self.separator, struct_hash)
    }

    /// Digest for an items proposal, given an already computed `items_hash`.
    pub fn items_digest(
        &self,
        terms: &LoanTerms,
        items_hash: B256,
        props: &SigProperties,
        side: Side,
    ) -> B256 {
        let struct_hash = encode_terms(
            LOAN_TERMS_WITH_ITEMS_TYPE,
            terms,
            CollateralBinding::Items(items_hash),
            props,
            side,
        );
        hash_typed_data(self.separator, struct_hash)
    }

    /// Digest for an items proposal, hashing the predicates first.
    pub fn items_digest_for(
        &self,
        terms: &LoanTerms,
        predicates: &[Predicate],
        props: &SigProperties,
        side: Side,
    ) -> B256 {
        self.items_digest(terms, items_hash(predicates), props, side)
    }
}

enum CollateralBinding {
    Id(U256),
    Items(B256),
}

fn encode_terms(
    type_string: &str,
    terms: &LoanTerms,
    binding: CollateralBinding,
    props: &SigProperties,
    side: Side,
) -> B256 {
    let enc = WordEncoder::with_capacity(11)
        .word(type_hash(type_string))
        .uint64(terms.duration_secs)
        .uint64(terms.deadline)
        .uint(terms.interest_rate)
        .uint(terms.principal)
        .address(terms.collateral_address);
    let enc = match binding {
        CollateralBinding::Id(id) => enc.uint(id),
        CollateralBinding::Items(hash) => enc.word(hash),
    };
    enc.address(terms.payable_currency)
        .word(terms.affiliate_code)
        .word(hash_sig_properties(props))
        .uint64(u64::from(side.as_u8()))
        .finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::Bytes;

    fn sample_terms() -> LoanTerms {
        LoanTerms {
            duration_secs: 30 * 86_400,
            principal: U256::from(10_000_000u64),
            interest_rate: U256::from(5u64) * U256::from(10u64).pow(U256::from(18u64)),
            collateral_address: Address::repeat_byte(0xC0),
            collateral_id: U256::from(42u64),
            payable_currency: Address::repeat_byte(0xDA),
            deadline: 1_900_000_000,
            affiliate_code: B256::ZERO,
        }
    }

    fn domain() -> TypedDataDomain {
        TypedDataDomain::new(DomainConfig {
            verifying_contract: Address::repeat_byte(0x11),
            ..DomainConfig::default()
        })
    }

    fn predicate(byte: u8) -> Predicate {
        Predicate {
            verifier: Address::repeat_byte(byte),
            data: Bytes::from(vec![byte; 4]),
        }
    }

    #[test]
    fn test_domain_separator_matches_eip712_mail_example() {
        // The "Ether Mail" domain from the EIP-712 reference example.
        let domain = TypedDataDomain::new(DomainConfig {
            name: "Ether Mail".to_string(),
            version: "1".to_string(),
            chain_id: 1,
            verifying_contract: "0xCcCCccccCCCCcCCCCCCcCcCccCcCCCcCcccccccC".parse().unwrap(),
        });
        let expected: B256 = "0xf2cee375fa42b42143804025fc449deafd50cc031ca257e0b194a650a912090f"
            .parse()
            .unwrap();
        assert_eq!(domain.separator(), expected);
    }

    #[test]
    fn test_digest_is_deterministic() {
        let d = domain();
        let props = SigProperties::single_use(1);
        let a = d.loan_terms_digest(&sample_terms(), &props, Side::Lend);
        let b = d.loan_terms_digest(&sample_terms(), &props, Side::Lend);
        assert_eq!(a, b);
    }

    #[test]
    fn test_every_field_is_bound() {
        let d = domain();
        let props = SigProperties::single_use(1);
        let base = d.loan_terms_digest(&sample_terms(), &props, Side::Lend);

        let mutations: Vec<Box<dyn Fn(&mut LoanTerms)>> = vec![
            Box::new(|t| t.duration_secs += 1),
            Box::new(|t| t.principal += U256::from(1u64)),
            Box::new(|t| t.interest_rate += U256::from(1u64)),
            Box::new(|t| t.collateral_address = Address::repeat_byte(0xC1)),
            Box::new(|t| t.collateral_id += U256::from(1u64)),
            Box::new(|t| t.payable_currency = Address::repeat_byte(0xDB)),
            Box::new(|t| t.deadline += 1),
            Box::new(|t| t.affiliate_code = B256::repeat_byte(1)),
        ];
        for mutate in mutations {
            let mut terms = sample_terms();
            mutate(&mut terms);
            assert_ne!(d.loan_terms_digest(&terms, &props, Side::Lend), base);
        }

        assert_ne!(d.loan_terms_digest(&sample_terms(), &props, Side::Borrow), base);
        assert_ne!(
            d.loan_terms_digest(&sample_terms(), &SigProperties::single_use(2), Side::Lend),
            base
        );
        let multi = SigProperties {
            max_uses: 2,
            ..props
        };
        assert_ne!(d.loan_terms_digest(&sample_terms(), &multi, Side::Lend), base);
    }

    #[test]
    fn test_items_shape_differs_from_plain_shape() {
        let d = domain();
        let props = SigProperties::single_use(9);
        let terms = sample_terms();
        let plain = d.loan_terms_digest(&terms, &props, Side::Borrow);

        // Even when the items hash is numerically equal to the collateral id,
        // the type hash keeps the shapes apart.
        let forged_items_hash = B256::from(terms.collateral_id.to_be_bytes::<32>());
        let items = d.items_digest(&terms, forged_items_hash, &props, Side::Borrow);
        assert_ne!(plain, items);
    }

    #[test]
    fn test_items_digest_ignores_collateral_id() {
        // The items shape is meant to authorize any container, so the id
        // is not part of what was signed.
        let d = domain();
        let props = SigProperties::single_use(3);
        let predicates = vec![predicate(1)];
        let mut terms = sample_terms();
        let a = d.items_digest_for(&terms, &predicates, &props, Side::Lend);
        terms.collateral_id = U256::from(999u64);
        let b = d.items_digest_for(&terms, &predicates, &props, Side::Lend);
        assert_eq!(a, b);
    }

    #[test]
    fn test_items_hash_order_and_content_sensitive() {
        let ab = items_hash(&[predicate(1), predicate(2)]);
        let ba = items_hash(&[predicate(2), predicate(1)]);
        assert_ne!(ab, ba);

        let mut tweaked = predicate(1);
        tweaked.data = Bytes::from(vec![0xFF]);
        assert_ne!(items_hash(&[tweaked, predicate(2)]), ab);
    }

    #[test]
    fn test_empty_items_hash_is_keccak_of_nothing() {
        assert_eq!(items_hash(&[]), keccak256(b""));
    }

    #[test]
    fn test_domain_binds_chain_and_contract() {
        let props = SigProperties::single_use(1);
        let terms = sample_terms();
        let base = domain().loan_terms_digest(&terms, &props, Side::Lend);

        let other_chain = TypedDataDomain::new(DomainConfig {
            chain_id: 5,
            verifying_contract: Address::repeat_byte(0x11),
            ..DomainConfig::default()
        });
        let other_contract = TypedDataDomain::new(DomainConfig {
            verifying_contract: Address::repeat_byte(0x12),
            ..DomainConfig::default()
        });
        assert_ne!(other_chain.loan_terms_digest(&terms, &props, Side::Lend), base);
        assert_ne!(other_contract.loan_terms_digest(&terms, &props, Side::Lend), base);
    }
}
