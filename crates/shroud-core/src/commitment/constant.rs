use std::collections::BTreeMap;

use rand::{CryptoRng, RngCore};
use sha2::{Digest, Sha256};

use super::{CommitmentFamily, CommitmentKind};
use crate::error::{Error, Result};
use crate::field::Field;
use crate::polynomial::Polynomial;
use crate::share::{Share, Shareholder};
use crate::wire::{WireReader, WireWriter};

const LEAF_PREFIX: u8 = 0x00;
const NODE_PREFIX: u8 = 0x01;
const DIGEST_LEN: usize = 32;

/// Constant-size commitments: a Merkle root over salted share hashes
///
/// The root is 32 bytes whatever the degree, and each shareholder's
/// witness grows with `log n`. The construction binds each shareholder to
/// one value but offers no homomorphism.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConstantScheme {
    field: Field,
}

impl ConstantScheme {
    pub fn new(field: Field) -> Self {
        Self { field }
    }
}

fn leaf_hash(shareholder: Shareholder, value: &[u8], salt: &[u8; DIGEST_LEN]) -> [u8; DIGEST_LEN] {
    let mut hasher = Sha256::new();
    hasher.update([LEAF_PREFIX]);
    hasher.update(shareholder.id().to_be_bytes());
    hasher.update((value.len() as u32).to_be_bytes());
    hasher.update(value);
    hasher.update(salt);
    hasher.finalize().into()
}

fn node_hash(left: &[u8; DIGEST_LEN], right: &[u8; DIGEST_LEN]) -> [u8; DIGEST_LEN] {
    let mut hasher = Sha256::new();
    hasher.update([NODE_PREFIX]);
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

impl CommitmentFamily for ConstantScheme {
    type Commitment = ConstantCommitment;

    fn kind(&self) -> CommitmentKind {
        CommitmentKind::Constant
    }

    fn field(&self) -> &Field {
        &self.field
    }

    fn generate<R: RngCore + CryptoRng + ?Sized>(
        &self,
        polynomial: &Polynomial,
        shareholders: &[Shareholder],
        rng: &mut R,
    ) -> Result<ConstantCommitment> {
        let mut holders = shareholders.to_vec();
        holders.sort();
        holders.dedup();
        if holders.is_empty() {
            return Err(Error::InvalidParameters(
                "constant commitment needs at least one shareholder".into(),
            ));
        }

        let mut salts = Vec::with_capacity(holders.len());
        let mut level: Vec<[u8; DIGEST_LEN]> = Vec::with_capacity(holders.len());
        for holder in &holders {
            let mut salt = [0u8; DIGEST_LEN];
            rng.fill_bytes(&mut salt);
            let value = polynomial.evaluate(&holder.to_field_element());
            level.push(leaf_hash(*holder, &value.to_bytes_be(), &salt));
            salts.push(salt);
        }

        // index of each leaf's ancestor in the current level
        let mut positions: Vec<usize> = (0..holders.len()).collect();
        let mut paths: Vec<Vec<(bool, [u8; DIGEST_LEN])>> = vec![Vec::new(); holders.len()];
        while level.len() > 1 {
            for (leaf, pos) in positions.iter_mut().enumerate() {
                let sibling = *pos ^ 1;
                if sibling < level.len() {
                    paths[leaf].push((sibling < *pos, level[sibling]));
                }
                *pos /= 2;
            }
            level = level
                .chunks(2)
                .map(|pair| match pair {
                    [left, right] => node_hash(left, right),
                    [single] => *single,
                    _ => unreachable!("chunks(2) yields one or two nodes"),
                })
                .collect();
        }

        let witnesses = holders
            .into_iter()
            .zip(salts)
            .zip(paths)
            .map(|((holder, salt), path)| (holder, ConstantWitness { salt, path }))
            .collect();
        Ok(ConstantCommitment {
            root: level[0],
            witnesses,
        })
    }

    fn verify(&self, share: &Share, commitment: &ConstantCommitment) -> bool {
        let Some(witness) = commitment.witnesses.get(&share.shareholder()) else {
            return false;
        };
        if !self.field.contains(share.value()) {
            return false;
        }
        let mut node = leaf_hash(
            share.shareholder(),
            &share.value().to_bytes_be(),
            &witness.salt,
        );
        for (sibling_left, sibling) in &witness.path {
            node = if *sibling_left {
                node_hash(sibling, &node)
            } else {
                node_hash(&node, sibling)
            };
        }
        node == commitment.root
    }

    fn sum(&self, _commitments: &[&ConstantCommitment]) -> Result<ConstantCommitment> {
        Err(Error::IncompatibleCommitments(
            "constant commitments are not homomorphic".into(),
        ))
    }
}

/// Opening data for one shareholder's leaf
#[derive(Clone, PartialEq, Eq)]
pub struct ConstantWitness {
    salt: [u8; DIGEST_LEN],
    /// `(sibling is on the left, sibling hash)` from the leaf upwards
    path: Vec<(bool, [u8; DIGEST_LEN])>,
}

impl std::fmt::Debug for ConstantWitness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConstantWitness")
            .field("path_len", &self.path.len())
            .finish()
    }
}

impl ConstantWitness {
    pub fn path_len(&self) -> usize {
        self.path.len()
    }
}

/// Merkle root plus the witnesses this holder knows about
#[derive(Clone, PartialEq, Eq)]
pub struct ConstantCommitment {
    root: [u8; DIGEST_LEN],
    witnesses: BTreeMap<Shareholder, ConstantWitness>,
}

impl std::fmt::Debug for ConstantCommitment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConstantCommitment")
            .field("root", &hex::encode(self.root))
            .field("witnesses", &self.witnesses.len())
            .finish()
    }
}

impl ConstantCommitment {
    pub fn root(&self) -> &[u8; DIGEST_LEN] {
        &self.root
    }

    pub fn witness(&self, shareholder: Shareholder) -> Option<&ConstantWitness> {
        self.witnesses.get(&shareholder)
    }

    /// The same root with only `shareholder`'s witness
    pub fn for_shareholder(&self, shareholder: Shareholder) -> Self {
        Self {
            root: self.root,
            witnesses: self
                .witnesses
                .get(&shareholder)
                .map(|w| BTreeMap::from([(shareholder, w.clone())]))
                .unwrap_or_default(),
        }
    }

    pub(super) fn encode(&self, w: &mut WireWriter) {
        w.write_bytes(&self.root);
        w.write_len(self.witnesses.len());
        for (holder, witness) in &self.witnesses {
            holder.encode(w);
            w.write_raw(&witness.salt);
            w.write_len(witness.path.len());
            for (left, sibling) in &witness.path {
                w.write_bool(*left);
                w.write_raw(sibling);
            }
        }
    }

    pub(super) fn decode(r: &mut WireReader<'_>) -> Result<Self> {
        let root_len = r.read_required_len()?;
        if root_len != DIGEST_LEN {
            return Err(Error::Serialization(format!(
                "constant commitment root of {root_len} bytes"
            )));
        }
        let root = r.read_array::<DIGEST_LEN>()?;
        let count = r.read_count(4 + DIGEST_LEN + 4)?.unwrap_or(0);
        let mut witnesses = BTreeMap::new();
        for _ in 0..count {
            let holder = Shareholder::decode(r)?;
            let salt = r.read_array::<DIGEST_LEN>()?;
            let path_len = r.read_count(1 + DIGEST_LEN)?.unwrap_or(0);
            let mut path = Vec::with_capacity(path_len);
            for _ in 0..path_len {
                let left = r.read_bool()?;
                path.push((left, r.read_array::<DIGEST_LEN>()?));
            }
            if witnesses
                .insert(holder, ConstantWitness { salt, path })
                .is_some()
            {
                return Err(Error::Serialization(format!(
                    "duplicate witness for shareholder {holder}"
                )));
            }
        }
        Ok(Self { root, witnesses })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigUint;
    use rand::thread_rng;

    fn setup(n: u32, degree: usize) -> (ConstantScheme, Polynomial, Vec<Shareholder>) {
        let field = Field::new(BigUint::from(2_147_483_647u32)).unwrap();
        let mut rng = thread_rng();
        let poly = Polynomial::random(&field, degree, &BigUint::from(99u32), &mut rng);
        let holders = (1..=n).map(|i| Shareholder::new(i).unwrap()).collect();
        (ConstantScheme::new(field), poly, holders)
    }

    #[test]
    fn test_every_tree_shape_verifies() {
        let mut rng = thread_rng();
        for n in 1..=9 {
            let (scheme, poly, holders) = setup(n, 2);
            let commitment = scheme.generate(&poly, &holders, &mut rng).unwrap();
            for holder in &holders {
                let share = Share::new(*holder, poly.evaluate(&holder.to_field_element()));
                assert!(scheme.verify(&share, &commitment), "n = {n}");
                assert!(scheme.verify(&share, &commitment.for_shareholder(*holder)));
            }
        }
    }

    #[test]
    fn test_witness_size_ignores_degree() {
        let mut rng = thread_rng();
        let (scheme, low, holders) = setup(8, 1);
        let (_, high, _) = setup(8, 6);
        let a = scheme.generate(&low, &holders, &mut rng).unwrap();
        let b = scheme.generate(&high, &holders, &mut rng).unwrap();
        let holder = holders[0];
        assert_eq!(a.witness(holder).unwrap().path_len(), 3);
        assert_eq!(
            a.witness(holder).unwrap().path_len(),
            b.witness(holder).unwrap().path_len()
        );
    }

    #[test]
    fn test_wrong_holder_or_value_rejected() {
        let mut rng = thread_rng();
        let (scheme, poly, holders) = setup(4, 1);
        let commitment = scheme.generate(&poly, &holders, &mut rng).unwrap();
        let value = poly.evaluate(&holders[0].to_field_element());
        assert!(!scheme.verify(&Share::new(holders[1], value.clone()), &commitment));
        let narrowed = commitment.for_shareholder(holders[1]);
        assert!(!scheme.verify(&Share::new(holders[0], value), &narrowed));
    }

    #[test]
    fn test_sum_fails_fast() {
        let mut rng = thread_rng();
        let (scheme, poly, holders) = setup(3, 1);
        let c = scheme.generate(&poly, &holders, &mut rng).unwrap();
        assert!(matches!(
            scheme.sum(&[&c, &c]),
            Err(Error::IncompatibleCommitments(_))
        ));
    }
}
