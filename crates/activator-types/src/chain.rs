// Copyright 2022 Webb Technologies Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use ethers::types::Address;
use serde::{Deserialize, Serialize};
use wallet_activator_utils::{Error, Result};

/// A chain name, like `zksync` or `zksync-sepolia`.
///
/// Names are lowercase ASCII letters, digits and dashes.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Chain(String);

impl Chain {
    /// Returns the chain name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Chain {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let valid = !s.is_empty()
            && s.chars()
                .all(|c| {
                    c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'
                });
        if valid {
            Ok(Self(s.to_owned()))
        } else {
            Err(Error::ChainNotFound {
                chain: s.to_owned(),
            })
        }
    }
}

impl Serialize for Chain {
    fn serialize<S>(
        &self,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Chain {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A chain-qualified address, written `<chain>:0x<hex>`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UAddress {
    chain: Chain,
    address: Address,
}

impl UAddress {
    pub fn new(chain: Chain, address: Address) -> Self {
        Self { chain, address }
    }

    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    pub fn address(&self) -> Address {
        self.address
    }
}

impl fmt::Display for UAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:#x}", self.chain, self.address)
    }
}

impl FromStr for UAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (chain, address) = s
            .split_once(':')
            .ok_or(Error::Generic("expected <chain>:<address>"))?;
        let address = address
            .parse::<Address>()
            .map_err(|_| Error::Generic("invalid account address"))?;
        Ok(Self {
            chain: chain.parse()?,
            address,
        })
    }
}

impl Serialize for UAddress {
    fn serialize<S>(
        &self,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for UAddress {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Account factory address of every configured chain.
///
/// Built once at startup and only read afterwards.
#[derive(Debug, Clone, Default)]
pub struct FactoryRegistry {
    factories: HashMap<Chain, Address>,
}

impl FactoryRegistry {
    /// Registers the factory of `chain`, replacing any previous one.
    pub fn with(mut self, chain: Chain, factory: Address) -> Self {
        self.factories.insert(chain, factory);
        self
    }

    /// Looks up the factory deployed on `chain`.
    pub fn get(&self, chain: &Chain) -> Result<Address> {
        self.factories
            .get(chain)
            .copied()
            .ok_or_else(|| Error::FactoryNotFound {
                chain: chain.to_string(),
            })
    }
}

impl FromIterator<(Chain, Address)> for FactoryRegistry {
    fn from_iter<T: IntoIterator<Item = (Chain, Address)>>(iter: T) -> Self {
        Self {
            factories: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_displays_uaddress() {
        let raw = "zksync-sepolia:0x5fbdb2315678afecb367f032d93f642f64180aa3";
        let address: UAddress = raw.parse().unwrap();
        assert_eq!(address.chain().as_str(), "zksync-sepolia");
        assert_eq!(address.to_string(), raw);
    }

    #[test]
    fn rejects_malformed_uaddress() {
        assert!("0x5fbdb2315678afecb367f032d93f642f64180aa3"
            .parse::<UAddress>()
            .is_err());
        assert!("Zksync:0x5fbdb2315678afecb367f032d93f642f64180aa3"
            .parse::<UAddress>()
            .is_err());
        assert!("zksync:0x1234".parse::<UAddress>().is_err());
    }

    #[test]
    fn uaddress_serde_as_string() {
        let address = UAddress::new(
            "zksync".parse().unwrap(),
            Address::repeat_byte(0x11),
        );
        let json = serde_json::to_string(&address).unwrap();
        assert_eq!(
            json,
            "\"zksync:0x1111111111111111111111111111111111111111\""
        );
        let back: UAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(back, address);
    }

    #[test]
    fn factory_lookup() {
        let zksync: Chain = "zksync".parse().unwrap();
        let registry = FactoryRegistry::default()
            .with(zksync.clone(), Address::repeat_byte(1));
        assert_eq!(registry.get(&zksync).unwrap(), Address::repeat_byte(1));
        let missing = registry.get(&"zksync-sepolia".parse().unwrap());
        assert!(matches!(missing, Err(Error::FactoryNotFound { .. })));
    }
}
