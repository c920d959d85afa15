use std::io::{Read, Write};

use crate::entry::{
    AccountEntry, AccountId, ClfEntry, Currency, LedgerEntry, LedgerKey, OfferEntry,
    TrustLineEntry,
};

use super::{DataFormat, DataFormatReader, DataHeaderOf, DataReadError, DataWriteError};

impl DataFormat for AccountId {
    type Header = ();
    const LATEST_HEADER: Self::Header = ();

    fn write_data<W: Write>(&self, writer: &mut W) -> Result<usize, DataWriteError> {
        self.0.write_data(writer)
    }

    fn read_data<R: Read>(reader: &mut R, _header: &Self::Header) -> Result<Self, DataReadError> {
        Ok(AccountId(reader.read_data(&())?))
    }
}

impl DataFormat for Currency {
    type Header = ();
    const LATEST_HEADER: Self::Header = ();

    fn write_data<W: Write>(&self, writer: &mut W) -> Result<usize, DataWriteError> {
        Ok(self.code.write_data(writer)? + self.issuer.write_data(writer)?)
    }

    fn read_data<R: Read>(reader: &mut R, _header: &Self::Header) -> Result<Self, DataReadError> {
        Ok(Currency {
            code: reader.read_data(&())?,
            issuer: reader.read_data(&())?,
        })
    }
}

impl DataFormat for LedgerKey {
    type Header = u8;
    const LATEST_HEADER: Self::Header = 1;

    fn write_data<W: Write>(&self, writer: &mut W) -> Result<usize, DataWriteError> {
        match self {
            LedgerKey::Account { account_id } => {
                Ok(0u8.write_data(writer)? + account_id.write_data(writer)?)
            }
            LedgerKey::TrustLine {
                account_id,
                currency,
            } => Ok(1u8.write_data(writer)?
                + account_id.write_data(writer)?
                + currency.write_data(writer)?),
            LedgerKey::Offer {
                account_id,
                sequence,
            } => Ok(2u8.write_data(writer)?
                + account_id.write_data(writer)?
                + sequence.write_data(writer)?),
        }
    }

    fn read_data<R: Read>(reader: &mut R, header: &Self::Header) -> Result<Self, DataReadError> {
        if *header != Self::LATEST_HEADER {
            return Err(DataReadError::unsupported(
                "LedgerKey",
                Self::LATEST_HEADER,
                header,
            ));
        }
        match reader.read_data::<u8>(&())? {
            0 => Ok(LedgerKey::Account {
                account_id: reader.read_data(&())?,
            }),
            1 => Ok(LedgerKey::TrustLine {
                account_id: reader.read_data(&())?,
                currency: reader.read_data(&())?,
            }),
            2 => Ok(LedgerKey::Offer {
                account_id: reader.read_data(&())?,
                sequence: reader.read_data(&())?,
            }),
            n => Err(DataReadError::Custom(format!(
                "invalid LedgerKey discriminant: {n}"
            ))),
        }
    }
}

impl DataFormat for AccountEntry {
    type Header = ();
    const LATEST_HEADER: Self::Header = ();

    fn write_data<W: Write>(&self, writer: &mut W) -> Result<usize, DataWriteError> {
        Ok(self.account_id.write_data(writer)?
            + self.balance.write_data(writer)?
            + self.sequence.write_data(writer)?
            + self.num_sub_entries.write_data(writer)?
            + self.inflation_dest.write_data(writer)?
            + self.flags.write_data(writer)?)
    }

    fn read_data<R: Read>(reader: &mut R, _header: &Self::Header) -> Result<Self, DataReadError> {
        Ok(AccountEntry {
            account_id: reader.read_data(&())?,
            balance: reader.read_data(&())?,
            sequence: reader.read_data(&())?,
            num_sub_entries: reader.read_data(&())?,
            inflation_dest: reader.read_data(&())?,
            flags: reader.read_data(&())?,
        })
    }
}

impl DataFormat for TrustLineEntry {
    type Header = ();
    const LATEST_HEADER: Self::Header = ();

    fn write_data<W: Write>(&self, writer: &mut W) -> Result<usize, DataWriteError> {
        Ok(self.account_id.write_data(writer)?
            + self.currency.write_data(writer)?
            + self.limit.write_data(writer)?
            + self.balance.write_data(writer)?
            + self.authorized.write_data(writer)?)
    }

    fn read_data<R: Read>(reader: &mut R, _header: &Self::Header) -> Result<Self, DataReadError> {
        Ok(TrustLineEntry {
            account_id: reader.read_data(&())?,
            currency: reader.read_data(&())?,
            limit: reader.read_data(&())?,
            balance: reader.read_data(&())?,
            authorized: reader.read_data(&())?,
        })
    }
}

impl DataFormat for OfferEntry {
    type Header = ();
    const LATEST_HEADER: Self::Header = ();

    fn write_data<W: Write>(&self, writer: &mut W) -> Result<usize, DataWriteError> {
        Ok(self.account_id.write_data(writer)?
            + self.sequence.write_data(writer)?
            + self.taker_gets.write_data(writer)?
            + self.taker_pays.write_data(writer)?
            + self.amount.write_data(writer)?
            + self.price.write_data(writer)?)
    }

    fn read_data<R: Read>(reader: &mut R, _header: &Self::Header) -> Result<Self, DataReadError> {
        Ok(OfferEntry {
            account_id: reader.read_data(&())?,
            sequence: reader.read_data(&())?,
            taker_gets: reader.read_data(&())?,
            taker_pays: reader.read_data(&())?,
            amount: reader.read_data(&())?,
            price: reader.read_data(&())?,
        })
    }
}

impl DataFormat for LedgerEntry {
    type Header = u8;
    const LATEST_HEADER: Self::Header = 1;

    fn write_data<W: Write>(&self, writer: &mut W) -> Result<usize, DataWriteError> {
        match self {
            LedgerEntry::Account(entry) => Ok(0u8.write_data(writer)? + entry.write_data(writer)?),
            LedgerEntry::TrustLine(entry) => {
                Ok(1u8.write_data(writer)? + entry.write_data(writer)?)
            }
            LedgerEntry::Offer(entry) => Ok(2u8.write_data(writer)? + entry.write_data(writer)?),
        }
    }

    fn read_data<R: Read>(reader: &mut R, header: &Self::Header) -> Result<Self, DataReadError> {
        if *header != Self::LATEST_HEADER {
            return Err(DataReadError::unsupported(
                "LedgerEntry",
                Self::LATEST_HEADER,
                header,
            ));
        }
        match reader.read_data::<u8>(&())? {
            0 => Ok(LedgerEntry::Account(reader.read_data(&())?)),
            1 => Ok(LedgerEntry::TrustLine(reader.read_data(&())?)),
            2 => Ok(LedgerEntry::Offer(reader.read_data(&())?)),
            n => Err(DataReadError::Custom(format!(
                "invalid LedgerEntry discriminant: {n}"
            ))),
        }
    }
}

impl DataFormat for ClfEntry {
    type Header = (DataHeaderOf<LedgerEntry>, DataHeaderOf<LedgerKey>);
    const LATEST_HEADER: Self::Header = (LedgerEntry::LATEST_HEADER, LedgerKey::LATEST_HEADER);

    fn write_data<W: Write>(&self, writer: &mut W) -> Result<usize, DataWriteError> {
        match self {
            ClfEntry::Live(entry) => Ok(0u8.write_data(writer)? + entry.write_data(writer)?),
            ClfEntry::Dead(key) => Ok(1u8.write_data(writer)? + key.write_data(writer)?),
        }
    }

    fn read_data<R: Read>(reader: &mut R, header: &Self::Header) -> Result<Self, DataReadError> {
        match reader.read_data::<u8>(&())? {
            0 => Ok(ClfEntry::Live(reader.read_data(&header.0)?)),
            1 => Ok(ClfEntry::Dead(reader.read_data(&header.1)?)),
            n => Err(DataReadError::Custom(format!(
                "invalid ClfEntry discriminant: {n}"
            ))),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::format::{read_dataformat, write_dataformat};

    fn account_id(byte: u8) -> AccountId {
        AccountId([byte; 32])
    }

    macro_rules! roundtrip {
        ($name:ident, $ty:ty, $value:expr) => {
            #[test]
            fn $name() {
                let value: $ty = $value;
                let mut data = Vec::new();
                write_dataformat(&mut data, &value).unwrap();

                let mut reader = &data[..];
                let read_value: $ty = read_dataformat(&mut reader).unwrap();
                assert_eq!(read_value, value);
                assert!(reader.is_empty(), "trailing bytes after decode");
            }
        };
    }

    roundtrip!(account_key, LedgerKey, LedgerKey::Account {
        account_id: account_id(3),
    });
    roundtrip!(trustline_key, LedgerKey, LedgerKey::TrustLine {
        account_id: account_id(3),
        currency: Currency {
            code: *b"USD\0",
            issuer: account_id(9),
        },
    });
    roundtrip!(offer_key, LedgerKey, LedgerKey::Offer {
        account_id: account_id(3),
        sequence: 77,
    });
    roundtrip!(live_account, ClfEntry, ClfEntry::Live(LedgerEntry::Account(AccountEntry {
        account_id: account_id(1),
        balance: -5,
        sequence: 42,
        num_sub_entries: 2,
        inflation_dest: Some(account_id(2)),
        flags: 0b101,
    })));
    roundtrip!(live_trustline, ClfEntry, ClfEntry::Live(LedgerEntry::TrustLine(TrustLineEntry {
        account_id: account_id(1),
        currency: Currency {
            code: *b"EUR\0",
            issuer: account_id(2),
        },
        limit: 1000,
        balance: 10,
        authorized: true,
    })));
    roundtrip!(live_offer, ClfEntry, ClfEntry::Live(LedgerEntry::Offer(OfferEntry {
        account_id: account_id(1),
        sequence: 9,
        taker_gets: Currency {
            code: *b"USD\0",
            issuer: account_id(2),
        },
        taker_pays: Currency {
            code: *b"EUR\0",
            issuer: account_id(3),
        },
        amount: 500,
        price: 1_250_000,
    })));
    roundtrip!(dead_entry, ClfEntry, ClfEntry::Dead(LedgerKey::Account {
        account_id: account_id(8),
    }));

    #[test]
    fn account_key_bytes() {
        let key = LedgerKey::Account {
            account_id: account_id(0xab),
        };
        let mut data = Vec::new();
        key.write_data(&mut data).unwrap();

        // discriminant byte then the raw account id
        assert_eq!(data.len(), 33);
        assert_eq!(data[0], 0);
        assert!(data[1..].iter().all(|b| *b == 0xab));
    }

    #[test]
    fn encoding_is_deterministic() {
        let entry = ClfEntry::Live(LedgerEntry::Account(AccountEntry {
            account_id: account_id(5),
            balance: 1,
            sequence: 2,
            num_sub_entries: 3,
            inflation_dest: None,
            flags: 4,
        }));
        let mut a = Vec::new();
        let mut b = Vec::new();
        entry.write_data(&mut a).unwrap();
        entry.write_data(&mut b).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn unknown_discriminant_is_rejected() {
        let data = [9u8];
        let mut reader = &data[..];
        let result = ClfEntry::read_data(&mut reader, &ClfEntry::LATEST_HEADER);
        assert!(result.is_err());
    }

    #[test]
    fn stale_header_is_rejected() {
        let key = LedgerKey::Account {
            account_id: account_id(1),
        };
        let mut data = Vec::new();
        key.write_data(&mut data).unwrap();

        let mut reader = &data[..];
        let result = LedgerKey::read_data(&mut reader, &0u8);
        assert!(result.is_err());
    }
}
