//! Simulated address derivation: SHA-256 over the phrase and ticker, rendered per currency.
//! Deterministic and one-way; no key material is produced.

use sha2::{Digest, Sha256};

use crate::learning::types::{Currency, Phrase};

const BASE58_ALPHABET: &[u8; 58] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";
const ETH_ADDRESS_BYTES: usize = 20;

#[derive(Debug, Clone, Copy, Default)]
pub struct AddressDeriver;

impl AddressDeriver {
    pub fn new() -> Self {
        Self
    }

    pub fn derive(&self, phrase: &Phrase, currency: Currency) -> String {
        derive_address(phrase, currency)
    }
}

pub fn derive_address(phrase: &Phrase, currency: Currency) -> String {
    let digest = phrase_digest(phrase, currency);
    match currency {
        Currency::Eth => format!("0x{}", hex::encode(&digest[..ETH_ADDRESS_BYTES])),
        Currency::Btc => base58_render('1', &digest),
        Currency::Ltc => base58_render('L', &digest),
    }
}

fn phrase_digest(phrase: &Phrase, currency: Currency) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(phrase.to_string().as_bytes());
    hasher.update(currency.ticker().as_bytes());
    hasher.finalize().into()
}

fn base58_render(lead: char, digest: &[u8]) -> String {
    let mut out = String::with_capacity(digest.len() + 1);
    out.push(lead);
    out.extend(
        digest
            .iter()
            .map(|b| BASE58_ALPHABET[*b as usize % BASE58_ALPHABET.len()] as char),
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wordlist::Wordlist;

    fn sample() -> Phrase {
        let list = Wordlist::bip39_english();
        Phrase::parse(
            "abandon ability able about above absent absorb abstract absurd abuse access accident",
            &list,
        )
        .unwrap()
    }

    #[test]
    fn test_deterministic() {
        let p = sample();
        for c in Currency::all() {
            assert_eq!(derive_address(&p, *c), derive_address(&p, *c));
        }
    }

    #[test]
    fn test_display_conventions() {
        let p = sample();
        let eth = derive_address(&p, Currency::Eth);
        assert!(eth.starts_with("0x"));
        assert_eq!(eth.len(), 42);
        assert!(eth[2..].chars().all(|c| c.is_ascii_hexdigit()));

        let btc = derive_address(&p, Currency::Btc);
        assert!(btc.starts_with('1'));
        assert_eq!(btc.len(), 33);
        assert!(btc.bytes().all(|b| BASE58_ALPHABET.contains(&b)));

        assert!(derive_address(&p, Currency::Ltc).starts_with('L'));
    }

    #[test]
    fn test_currency_changes_address() {
        let p = sample();
        assert_ne!(
            derive_address(&p, Currency::Btc)[1..],
            derive_address(&p, Currency::Ltc)[1..]
        );
    }
}
