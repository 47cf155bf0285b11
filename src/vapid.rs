use anyhow::{Context, Result};
use base64::{engine::general_purpose, Engine};
use openssl::bn::BigNumContext;
use openssl::ec::{EcGroup, EcKey, EcPoint, PointConversionForm};
use openssl::nid::Nid;

/// VAPID key pair, both halves unpadded base64url.
///
/// The public key is the 65-byte uncompressed P-256 point handed to browsers
/// as `applicationServerKey`; the private key is the raw 32-byte scalar.
#[derive(Debug)]
pub struct VapidKeys {
    pub public_key: String,
    pub private_key: String,
}

fn p256() -> Result<EcGroup> {
    EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).context("group creation")
}

pub fn generate() -> Result<VapidKeys> {
    let group = p256()?;
    let key = EcKey::generate(&group).context("key generation")?;
    let mut ctx = BigNumContext::new().context("bignum context creation")?;

    let public = key
        .public_key()
        .to_bytes(&group, PointConversionForm::UNCOMPRESSED, &mut ctx)
        .context("public key serialization")?;
    let scalar = key.private_key().to_vec();
    let mut private = vec![0u8; 32usize.saturating_sub(scalar.len())];
    private.extend(scalar);

    Ok(VapidKeys {
        public_key: general_purpose::URL_SAFE_NO_PAD.encode(public),
        private_key: general_purpose::URL_SAFE_NO_PAD.encode(private),
    })
}

/// Checks that `key` is an uncompressed point on P-256.
pub fn validate_public_key(key: &str) -> Result<()> {
    let raw_key = crate::key::url_base64_to_bytes(key).context("key decoding")?;
    anyhow::ensure!(
        raw_key.len() == 65 && raw_key[0] == 0x04,
        "expected a 65-byte uncompressed point, got {} bytes",
        raw_key.len()
    );

    let group = p256()?;
    let mut ctx = BigNumContext::new().context("bignum context creation")?;
    let point = EcPoint::from_bytes(&group, &raw_key, &mut ctx).context("loading key")?;
    EcKey::from_public_key(&group, &point)
        .context("key creation")?
        .check_key()
        .context("key check")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_have_vapid_shape() {
        let keys = generate().unwrap();

        let public = crate::key::url_base64_to_bytes(&keys.public_key).unwrap();
        assert_eq!(public.len(), 65);
        assert_eq!(public[0], 0x04);

        let private = general_purpose::URL_SAFE_NO_PAD
            .decode(&keys.private_key)
            .unwrap();
        assert_eq!(private.len(), 32);

        assert!(!keys.public_key.contains('='));
        validate_public_key(&keys.public_key).unwrap();
    }

    #[test]
    fn fresh_keys_differ() {
        assert_ne!(generate().unwrap().public_key, generate().unwrap().public_key);
    }

    #[test]
    fn rejects_wrong_length() {
        let short = general_purpose::URL_SAFE_NO_PAD.encode([0x04; 33]);
        assert!(validate_public_key(&short).is_err());
    }

    #[test]
    fn rejects_point_off_curve() {
        let mut bogus = vec![0x04];
        bogus.extend([0x01; 64]);
        let encoded = general_purpose::URL_SAFE_NO_PAD.encode(bogus);
        assert!(validate_public_key(&encoded).is_err());
    }

    #[test]
    fn rejects_garbage() {
        assert!(validate_public_key("not a key!").is_err());
    }
}
