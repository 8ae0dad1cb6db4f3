//! CBOR encoding of ledger records and the id-list helpers shared by the
//! entities that keep lots in lists.
use crate::error::{LedgerError, Result};

/// A self-describing ledger record.
pub trait Record: minicbor::Encode<()> + for<'b> minicbor::Decode<'b, ()> {
    /// Value of the `doc_type` discriminator.
    const DOC_TYPE: &'static str;

    fn doc_type(&self) -> &str;
}

pub fn encode_record<T: Record>(key: &str, record: &T) -> Result<Vec<u8>> {
    minicbor::to_vec(record)
        .map_err(|e| LedgerError::Storage(format!("cannot encode {} {key}: {e}", T::DOC_TYPE)))
}

pub fn decode_record<T: Record>(key: &str, bytes: &[u8]) -> Result<T> {
    let record: T =
        minicbor::decode(bytes).map_err(|e| LedgerError::decoding(T::DOC_TYPE, key, e))?;
    if record.doc_type() != T::DOC_TYPE {
        return Err(LedgerError::decoding(
            T::DOC_TYPE,
            key,
            format!("doc_type is {:?}", record.doc_type()),
        ));
    }
    Ok(record)
}

/// Index of `id` in `list`, or a validation error naming the list.
pub fn position_in(list: &[String], id: &str, list_name: &str, owner: &str) -> Result<usize> {
    list.iter().position(|item| item == id).ok_or_else(|| {
        LedgerError::Validation(format!("lot {id} is not in the {list_name} list of {owner}"))
    })
}

/// Fails if `id` already sits in any of `lists`.
pub fn ensure_unlisted(lists: &[(&str, &[String])], id: &str, owner: &str) -> Result<()> {
    for (name, list) in lists {
        if list.iter().any(|item| item == id) {
            return Err(LedgerError::Validation(format!(
                "lot {id} is already in the {name} list of {owner}"
            )));
        }
    }
    Ok(())
}

/// Rejects duplicate ids within one request.
pub fn ensure_distinct<'a>(ids: impl IntoIterator<Item = &'a str>) -> Result<()> {
    let mut seen = std::collections::BTreeSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(LedgerError::Validation(format!(
                "lot {id} appears more than once"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[derive(Debug, PartialEq, minicbor::Encode, minicbor::Decode)]
    #[cbor(map)]
    struct Crate {
        #[n(0)]
        doc_type: String,
        #[n(1)]
        items: Vec<String>,
    }

    impl Record for Crate {
        const DOC_TYPE: &'static str = "crate";
        fn doc_type(&self) -> &str {
            &self.doc_type
        }
    }

    #[test]
    fn wrong_doc_type_is_decoding_error() {
        let other = Crate {
            doc_type: "pallet".into(),
            items: vec![],
        };
        let bytes = minicbor::to_vec(&other).unwrap();

        let err = decode_record::<Crate>("C1", &bytes).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decoding);
    }

    struct Unencodable;

    impl<C> minicbor::Encode<C> for Unencodable {
        fn encode<W: minicbor::encode::Write>(
            &self,
            _: &mut minicbor::Encoder<W>,
            _: &mut C,
        ) -> std::result::Result<(), minicbor::encode::Error<W::Error>> {
            Err(minicbor::encode::Error::message("value out of range"))
        }
    }

    impl<'b, C> minicbor::Decode<'b, C> for Unencodable {
        fn decode(
            _: &mut minicbor::Decoder<'b>,
            _: &mut C,
        ) -> std::result::Result<Self, minicbor::decode::Error> {
            Ok(Unencodable)
        }
    }

    impl Record for Unencodable {
        const DOC_TYPE: &'static str = "unencodable";
        fn doc_type(&self) -> &str {
            Self::DOC_TYPE
        }
    }

    #[test]
    fn encoding_failure_is_storage_error() {
        let err = encode_record("U1", &Unencodable).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Storage);
    }

    #[test]
    fn garbage_is_decoding_error() {
        let err = decode_record::<Crate>("C1", &[0xff, 0x00, 0x13]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decoding);
    }

    #[test]
    fn empty_list_survives_round_trip() {
        let record = Crate {
            doc_type: "crate".into(),
            items: vec![],
        };
        let bytes = encode_record("C1", &record).unwrap();
        let decoded: Crate = decode_record("C1", &bytes).unwrap();
        assert_eq!(decoded, record);
        assert_eq!(bytes, encode_record("C1", &decoded).unwrap());
    }

    #[test]
    fn list_helpers() {
        let list = vec!["L1".to_string(), "L2".to_string()];
        assert_eq!(position_in(&list, "L2", "using", "M1").unwrap(), 1);
        assert!(position_in(&list, "L3", "using", "M1").is_err());

        assert!(ensure_unlisted(&[("using", &list)], "L3", "M1").is_ok());
        assert!(ensure_unlisted(&[("using", &list)], "L1", "M1").is_err());

        assert!(ensure_distinct(["a", "b"]).is_ok());
        assert!(ensure_distinct(["a", "b", "a"]).is_err());
    }
}
