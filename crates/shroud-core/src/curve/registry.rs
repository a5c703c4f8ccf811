use std::collections::BTreeMap;
use std::sync::Arc;

use super::{constants, CurveParameters, EllipticCurve};
use crate::error::{Error, Result};

/// Curves known to a replica, keyed by name, with exactly one current curve
#[derive(Clone, Debug)]
pub struct CurveRegistry {
    curves: BTreeMap<String, Arc<EllipticCurve>>,
    current: String,
}

impl CurveRegistry {
    /// Registry holding `initial`, which becomes the current curve
    pub fn new(initial: CurveParameters) -> Result<Self> {
        let curve = Arc::new(EllipticCurve::new(initial)?);
        let current = curve.name().to_string();
        let mut curves = BTreeMap::new();
        curves.insert(current.clone(), curve);
        Ok(Self { curves, current })
    }

    /// Registry holding every built-in curve, with `current` selected
    pub fn with_builtin(current: &str) -> Result<Self> {
        let initial =
            constants::by_name(current).ok_or_else(|| Error::UnknownCurve(current.to_string()))?;
        let mut registry = Self::new(initial)?;
        for params in constants::builtin() {
            registry.register(params)?;
        }
        Ok(registry)
    }

    /// Add a curve; an existing entry with the same name is replaced only if
    /// the parameters are identical
    pub fn register(&mut self, params: CurveParameters) -> Result<Arc<EllipticCurve>> {
        if let Some(existing) = self.curves.get(&params.name) {
            if existing.parameters() == &params {
                return Ok(Arc::clone(existing));
            }
            return Err(Error::InvalidParameters(format!(
                "curve {} already registered with different parameters",
                params.name
            )));
        }
        let curve = Arc::new(EllipticCurve::new(params)?);
        self.curves
            .insert(curve.name().to_string(), Arc::clone(&curve));
        Ok(curve)
    }

    /// Switch the current curve; returns `false` for unknown names
    pub fn set_current(&mut self, name: &str) -> bool {
        if self.curves.contains_key(name) {
            self.current = name.to_string();
            true
        } else {
            false
        }
    }

    pub fn current(&self) -> Arc<EllipticCurve> {
        // the current name always refers to a registered curve
        Arc::clone(&self.curves[&self.current])
    }

    pub fn current_name(&self) -> &str {
        &self.current
    }

    pub fn get(&self, name: &str) -> Option<Arc<EllipticCurve>> {
        self.curves.get(name).cloned()
    }

    pub fn require(&self, name: &str) -> Result<Arc<EllipticCurve>> {
        self.get(name)
            .ok_or_else(|| Error::UnknownCurve(name.to_string()))
    }

    pub fn names(&self) -> Vec<String> {
        self.curves.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry() {
        let mut registry = CurveRegistry::with_builtin(constants::SECP256R1).unwrap();
        assert_eq!(registry.current().name(), constants::SECP256R1);
        assert_eq!(registry.names().len(), 3);

        assert!(registry.set_current(constants::BLS12_381));
        assert_eq!(registry.current_name(), constants::BLS12_381);
        assert!(!registry.set_current("curve25519"));
        assert_eq!(registry.current_name(), constants::BLS12_381);
    }

    #[test]
    fn test_conflicting_registration_rejected() {
        let mut registry = CurveRegistry::new(constants::secp256k1()).unwrap();
        let mut forged = constants::secp256r1();
        forged.name = constants::SECP256K1.to_string();
        assert!(registry.register(forged).is_err());
        assert!(registry.register(constants::secp256k1()).is_ok());
    }

    #[test]
    fn test_unknown_builtin() {
        assert_eq!(
            CurveRegistry::with_builtin("ed448").unwrap_err(),
            Error::UnknownCurve("ed448".into())
        );
    }
}
