use core::fmt;
use core::marker::PhantomData;

use alloy_rlp::{Decodable, Encodable, Error as RlpError, Result as RlpResult};
use serde::de::{SeqAccess, Visitor};
use serde::ser::SerializeTuple;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A fixed-size array that RLP-encodes as a list.
///
/// `alloy_rlp`'s derive macros only support `[u8; N]` natively; every other
/// element type needs an explicit `Encodable`/`Decodable` impl. This wrapper
/// supplies one (list-of-N, matching the encoding a derive would produce if
/// it supported arbitrary arrays) so tier-indexed header fields can stay
/// fixed-size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TierArray<T, const N: usize>(pub [T; N]);

impl<T: Serialize, const N: usize> Serialize for TierArray<T, N> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(N)?;
        for item in &self.0 {
            tuple.serialize_element(item)?;
        }
        tuple.end()
    }
}

struct TierArrayVisitor<T, const N: usize>(PhantomData<T>);

impl<'de, T: Deserialize<'de>, const N: usize> Visitor<'de> for TierArrayVisitor<T, N> {
    type Value = TierArray<T, N>;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "a sequence of {N} elements")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut items = Vec::with_capacity(N);
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        let got = items.len();
        let array: [T; N] = items
            .try_into()
            .map_err(|_| serde::de::Error::invalid_length(got, &self))?;
        Ok(TierArray(array))
    }
}

impl<'de, T: Deserialize<'de>, const N: usize> Deserialize<'de> for TierArray<T, N> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_tuple(N, TierArrayVisitor(PhantomData))
    }
}

impl<T, const N: usize> core::ops::Deref for TierArray<T, N> {
    type Target = [T; N];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T, const N: usize> core::ops::DerefMut for TierArray<T, N> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl<T, const N: usize> From<[T; N]> for TierArray<T, N> {
    fn from(value: [T; N]) -> Self {
        Self(value)
    }
}

impl<T: Encodable, const N: usize> Encodable for TierArray<T, N> {
    fn length(&self) -> usize {
        alloy_rlp::list_length(&self.0)
    }

    fn encode(&self, out: &mut dyn alloy_rlp::bytes::BufMut) {
        alloy_rlp::encode_list(&self.0, out)
    }
}

impl<T: Decodable, const N: usize> Decodable for TierArray<T, N> {
    fn decode(buf: &mut &[u8]) -> RlpResult<Self> {
        let items = Vec::<T>::decode(buf)?;
        let got = items.len();
        let array: [T; N] =
            items.try_into().map_err(|_| RlpError::ListLengthMismatch { expected: N, got })?;
        Ok(Self(array))
    }
}
