use core::fmt;
use serde::de::{SeqAccess, Visitor};
use serde::{de, Deserialize, Deserializer, Serialize};
use thiserror::Error;

/******************************
 *
 * Endpoint ID
 *
 ******************************/

const ENDPOINT_URI_SCHEME_DTN: u8 = 1;
const ENDPOINT_URI_SCHEME_IPN: u8 = 2;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct IpnAddress(u64, u64);

impl IpnAddress {
    pub fn new(node: u64, service: u64) -> IpnAddress {
        IpnAddress(node, service)
    }
    pub fn node_number(&self) -> u64 {
        self.0
    }
    pub fn service_number(&self) -> u64 {
        self.1
    }
}

impl fmt::Display for IpnAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}", self.0, self.1)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EndpointIdError {
    #[error("unknown address scheme `{0}`")]
    UnknownScheme(u8),
    #[error("invalid node number `{0}` for ipn address")]
    InvalidNodeNumber(u64),
    #[error("invalid dtn endpoint `{0}`")]
    InvalidDtnEndpoint(String),
}

/// Represents an endpoint in various addressing schemes.
///
/// Either the *none* endpoint, a dtn one or an ipn endpoint.
#[derive(Debug, Clone, Serialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum EndpointID {
    Dtn(u8, String),
    DtnNone(u8, u8),
    Ipn(u8, IpnAddress),
}

impl<'de> Deserialize<'de> for EndpointID {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct EndpointIDVisitor;

        impl<'de> Visitor<'de> for EndpointIDVisitor {
            type Value = EndpointID;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("EndpointID")
            }

            fn visit_seq<V>(self, mut seq: V) -> Result<Self::Value, V::Error>
            where
                V: SeqAccess<'de>,
            {
                let eid_type: u8 = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                if eid_type == ENDPOINT_URI_SCHEME_DTN {
                    // the none endpoint is encoded as the unsigned integer 0
                    let name: String = seq.next_element().unwrap_or_default().unwrap_or_default();
                    if name.is_empty() {
                        Ok(EndpointID::none())
                    } else {
                        Ok(EndpointID::Dtn(eid_type, name))
                    }
                } else if eid_type == ENDPOINT_URI_SCHEME_IPN {
                    let ipnaddr: IpnAddress = seq
                        .next_element()?
                        .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                    Ok(EndpointID::Ipn(eid_type, ipnaddr))
                } else {
                    Err(de::Error::invalid_value(
                        de::Unexpected::Unsigned(eid_type.into()),
                        &self,
                    ))
                }
            }
        }

        deserializer.deserialize_any(EndpointIDVisitor)
    }
}

impl Default for EndpointID {
    fn default() -> Self {
        EndpointID::DtnNone(ENDPOINT_URI_SCHEME_DTN, 0)
    }
}

impl EndpointID {
    /// Default returns a `dtn:none` endpoint
    pub fn new() -> EndpointID {
        Default::default()
    }
    /// Create a new EndpointID with dtn addressing scheme
    ///
    /// This can either be a host id such as `node1` or
    /// include an application agents endpoint, e.g., `node1/endpoint1`
    pub fn with_dtn(host_with_endpoint: &str) -> Result<EndpointID, EndpointIdError> {
        if host_with_endpoint.is_empty() {
            return Err(EndpointIdError::InvalidDtnEndpoint(
                host_with_endpoint.to_owned(),
            ));
        }
        Ok(EndpointID::Dtn(
            ENDPOINT_URI_SCHEME_DTN,
            host_with_endpoint.to_owned(),
        ))
    }
    /// Create a new 'dtn:none' endpoint
    pub const fn none() -> EndpointID {
        EndpointID::DtnNone(ENDPOINT_URI_SCHEME_DTN, 0)
    }
    /// Create a new EndpointID with ipn addressing scheme, e.g., `ipn:23.42`
    ///
    /// **host must be > 0**
    pub fn with_ipn(host: u64, endpoint: u64) -> Result<EndpointID, EndpointIdError> {
        if host == 0 {
            return Err(EndpointIdError::InvalidNodeNumber(host));
        }
        Ok(EndpointID::Ipn(
            ENDPOINT_URI_SCHEME_IPN,
            IpnAddress::new(host, endpoint),
        ))
    }
    pub fn is_none(&self) -> bool {
        matches!(self, EndpointID::DtnNone(_, _))
    }
    pub fn scheme(&self) -> u8 {
        match self {
            EndpointID::Dtn(scheme, _) => *scheme,
            EndpointID::DtnNone(scheme, _) => *scheme,
            EndpointID::Ipn(scheme, _) => *scheme,
        }
    }
}

impl fmt::Display for EndpointID {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EndpointID::Dtn(_, name) => write!(f, "dtn://{}", name),
            EndpointID::DtnNone(_, _) => write!(f, "dtn:none"),
            EndpointID::Ipn(_, addr) => write!(f, "ipn:{}", addr),
        }
    }
}
