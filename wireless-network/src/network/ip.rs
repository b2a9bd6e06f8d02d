use anyhow::{Context, anyhow, bail};
use std::fmt::{Display, Formatter};
use std::net::Ipv4Addr;
use std::str::FromStr;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Ipv4Cidr {
    pub(crate) address: Ipv4Addr,
    pub(crate) network_prefix: u8,
}

impl Ipv4Cidr {
    pub fn new(address: Ipv4Addr, network_prefix: u8) -> anyhow::Result<Self> {
        if network_prefix == 0 || network_prefix > 32 {
            bail!("invalid network prefix: {network_prefix}");
        }

        Ok(Self {
            address,
            network_prefix,
        })
    }

    pub fn address(&self) -> Ipv4Addr {
        self.address
    }

    fn mask(&self) -> u32 {
        u32::MAX << (32 - self.network_prefix as u32)
    }

    pub fn network(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.address.to_bits() & self.mask())
    }

    pub fn contains(&self, address: Ipv4Addr) -> bool {
        address.to_bits() & self.mask() == self.network().to_bits()
    }
}

impl Display for Ipv4Cidr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.address, self.network_prefix)
    }
}

impl FromStr for Ipv4Cidr {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('/');
        let base_ip: Ipv4Addr = parts
            .next()
            .ok_or(anyhow!("empty string"))?
            .parse()
            .context("invalid IPv4 address in network range")?;

        // A missing network prefix is interpreted as /32 (i.e. singleton ip range)
        let network_prefix: u8 = parts
            .next()
            .unwrap_or("32")
            .parse()
            .context("the provided network prefix is not a valid unsigned integer")?;

        if parts.next().is_some() {
            bail!("network range contains trailing characters");
        }

        Self::new(base_ip, network_prefix)
    }
}

/// Hands out consecutive host addresses of a network, starting right after the network address
pub struct Ipv4AddressAllocator {
    network: Ipv4Cidr,
    next_host: u32,
}

impl Ipv4AddressAllocator {
    pub fn new(network: Ipv4Cidr) -> Self {
        Self {
            network,
            next_host: 1,
        }
    }

    pub fn next_address(&mut self) -> anyhow::Result<Ipv4Addr> {
        let host_bits = 32 - self.network.network_prefix as u32;
        let host_count = 1u64 << host_bits;

        // The all-ones host is the broadcast address
        if host_count < 4 || self.next_host as u64 >= host_count - 1 {
            bail!("network {} has no free host addresses left", self.network);
        }

        let address = Ipv4Addr::from(self.network.network().to_bits() + self.next_host);
        self.next_host += 1;
        Ok(address)
    }
}
