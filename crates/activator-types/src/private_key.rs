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

use std::str::FromStr;

use ethers::types::H256;
use serde::Deserialize;

type Secret = H256;

/// PrivateKey represents a private key used to sign deployment transactions.
///
/// Accepts a `0x` prefixed hex string or `$VAR` naming an environment
/// variable that holds one.
#[derive(Clone)]
pub struct PrivateKey(Secret);

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PrivateKey(..)")
    }
}

impl From<Secret> for PrivateKey {
    fn from(secret: Secret) -> Self {
        PrivateKey(secret)
    }
}

impl std::ops::Deref for PrivateKey {
    type Target = Secret;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<'de> Deserialize<'de> for PrivateKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct PrivateKeyVistor;
        impl<'de> serde::de::Visitor<'de> for PrivateKeyVistor {
            type Value = Secret;

            fn expecting(
                &self,
                formatter: &mut std::fmt::Formatter,
            ) -> std::fmt::Result {
                formatter.write_str(
                    "hex string or an env var containing a hex string in it",
                )
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                let (source, hex) = if let Some(var) = value.strip_prefix('$')
                {
                    tracing::trace!("Reading {} from env", var);
                    let val = std::env::var(var).map_err(|e| {
                        serde::de::Error::custom(format!(
                            "error while loading this env {var}: {e}",
                        ))
                    })?;
                    ("env", val)
                } else {
                    ("value", value.to_owned())
                };
                if !hex.starts_with("0x") {
                    return Err(serde::de::Error::custom(format!(
                        "private key {source} must be a 0x prefixed hex string"
                    )));
                }
                Secret::from_str(&hex).map_err(|e| {
                    serde::de::Error::custom(format!(
                        "{e}\n expected a 66 chars string (including the 0x prefix) but found {} chars",
                        hex.len()
                    ))
                })
            }
        }

        let secret = deserializer.deserialize_str(PrivateKeyVistor)?;
        Ok(Self(secret))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_hex_and_env() {
        let hex = format!("{:#x}", H256::repeat_byte(0x42));
        let key: PrivateKey =
            serde_json::from_value(serde_json::Value::String(hex.clone()))
                .unwrap();
        assert_eq!(*key, H256::repeat_byte(0x42));

        std::env::set_var("WALLET_TEST_PRIVATE_KEY", &hex);
        let key: PrivateKey =
            serde_json::from_str("\"$WALLET_TEST_PRIVATE_KEY\"").unwrap();
        assert_eq!(*key, H256::repeat_byte(0x42));
        assert_eq!(format!("{key:?}"), "PrivateKey(..)");
    }

    #[test]
    fn rejects_short_keys() {
        assert!(serde_json::from_str::<PrivateKey>("\"0x1234\"").is_err());
        assert!(serde_json::from_str::<PrivateKey>("\"abcd\"").is_err());
    }
}
