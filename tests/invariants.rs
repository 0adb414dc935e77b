//! Property tests for ledger and settlement invariants.

use proptest::prelude::*;

use stablecoin::auction::CollateralAuction;
use stablecoin::core::{CallContext, ProtocolConfig};
use stablecoin::oracle::PriceSigner;
use stablecoin::protocol::{Asset, Protocol, ProtocolEvent, ProtocolOperation};
use stablecoin::utils::constants::{AUCTION_DURATION_SECS, PUBKEY_LENGTH, WAD};
use stablecoin::utils::crypto::PublicKey;

fn account(byte: u8) -> PublicKey {
    let mut bytes = [byte; PUBKEY_LENGTH];
    bytes[0] = 0x03;
    PublicKey::new(bytes)
}

fn admin() -> PublicKey {
    PublicKey::new([0x02; PUBKEY_LENGTH])
}

fn priced_protocol(signer: &PriceSigner, price: u128) -> Protocol {
    let mut protocol = Protocol::new(ProtocolConfig::default(), admin()).unwrap();
    let ctx = CallContext::new(admin(), 0);
    protocol
        .execute(&ctx, ProtocolOperation::AuthorizeSigner { signer: signer.public_key() })
        .unwrap();
    protocol
        .execute(
            &ctx,
            ProtocolOperation::UpdatePrice {
                nonce: 1,
                price,
                signature: signer.sign_price(1, price, "ETH"),
                symbol: "ETH".into(),
            },
        )
        .unwrap();
    protocol
}

fn fund(protocol: &mut Protocol, to: PublicKey, amount: u128) {
    protocol
        .execute(
            &CallContext::new(admin(), 0),
            ProtocolOperation::Mint {
                asset: Asset::Collateral("ETH".into()),
                to,
                amount,
            },
        )
        .unwrap();
}

fn produce(protocol: &mut Protocol, who: PublicKey, collateral: u128, ratio: u128, now: u64) {
    protocol
        .execute(
            &CallContext::new(who, now),
            ProtocolOperation::ProduceStable {
                collateral_amount: collateral,
                target_ratio: ratio,
                symbol: "ETH".into(),
            },
        )
        .unwrap();
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_debt_ledger_matches_positions(
        deposits in prop::collection::vec((1u128..=50, 150u128..=400, 0u128..=100), 1..5),
    ) {
        let signer = PriceSigner::generate();
        let mut protocol = priced_protocol(&signer, 2000 * WAD);

        for (i, (eth, ratio_pct, repay_pct)) in deposits.iter().enumerate() {
            let user = account(i as u8 + 1);
            let collateral = eth * WAD / 10;
            fund(&mut protocol, user, collateral);
            produce(&mut protocol, user, collateral, ratio_pct * WAD / 100, 10);

            let debt = protocol.router().position(&user, "ETH").unwrap().debt_amount;
            let repay = debt * repay_pct / 100;
            if repay > 0 {
                protocol
                    .execute(
                        &CallContext::new(user, 20),
                        ProtocolOperation::RepayStable { amount: repay, symbol: "ETH".into() },
                    )
                    .unwrap();
            }
        }

        let summed: u128 = protocol.router().positions().map(|p| p.debt_amount).sum();
        prop_assert_eq!(protocol.router().total_debt(), summed);
        prop_assert_eq!(protocol.total_supply(&Asset::Stable).unwrap(), summed);
        prop_assert!(protocol.verify_invariants().is_ok());
    }

    #[test]
    fn prop_liquidation_proceeds_are_fully_accounted(elapsed in 0u64..=AUCTION_DURATION_SECS) {
        let signer = PriceSigner::generate();
        let mut protocol = priced_protocol(&signer, 2000 * WAD);
        let (borrower, keeper) = (account(1), account(2));
        fund(&mut protocol, borrower, 10 * WAD);
        fund(&mut protocol, keeper, 20 * WAD);
        produce(&mut protocol, borrower, 10 * WAD, 2 * WAD, 10);
        produce(&mut protocol, keeper, 20 * WAD, 2 * WAD, 10);

        protocol
            .execute(
                &CallContext::new(admin(), 100),
                ProtocolOperation::UpdatePrice {
                    nonce: 2,
                    price: 1000 * WAD,
                    signature: signer.sign_price(2, 1000 * WAD, "ETH"),
                    symbol: "ETH".into(),
                },
            )
            .unwrap();
        let keeper_ctx = CallContext::new(keeper, 100);
        protocol
            .execute(&keeper_ctx, ProtocolOperation::Liquidate { owner: borrower, symbol: "ETH".into() })
            .unwrap();
        protocol
            .execute(
                &keeper_ctx,
                ProtocolOperation::Approve {
                    asset: Asset::Stable,
                    spender: CollateralAuction::account_for("ETH"),
                    amount: u128::MAX,
                },
            )
            .unwrap();

        let events = protocol
            .execute(
                &CallContext::new(keeper, 100 + elapsed),
                ProtocolOperation::BuyLotById { symbol: "ETH".into(), lot_id: 0 },
            )
            .unwrap();
        let settled = match events.last() {
            Some(ProtocolEvent::LiquidationSettled(settled)) => settled.clone(),
            other => panic!("unexpected event {:?}", other),
        };

        let debt = 10_000 * WAD;
        prop_assert!(settled.closed);
        prop_assert_eq!(
            settled.proceeds,
            settled.principal_repaid + settled.surplus_added + settled.extra_credited
        );
        prop_assert_eq!(settled.principal_repaid + settled.deficit_added, debt);
        prop_assert!(settled.surplus_added <= 1_000 * WAD);
        prop_assert!(settled.extra_credited == 0 || settled.surplus_added == 1_000 * WAD);
        prop_assert_eq!(protocol.router().deficit(), settled.deficit_added);
        prop_assert!(protocol.verify_invariants().is_ok());
    }

    #[test]
    fn prop_replayed_nonce_never_moves_price(nonce in 0u64..=1, price in 1u128..=1_000_000) {
        let signer = PriceSigner::generate();
        let mut protocol = priced_protocol(&signer, 2000 * WAD);

        let result = protocol.execute(
            &CallContext::new(admin(), 5),
            ProtocolOperation::UpdatePrice {
                nonce,
                price: price * WAD,
                signature: signer.sign_price(nonce, price * WAD, "ETH"),
                symbol: "ETH".into(),
            },
        );

        prop_assert!(result.is_err());
        prop_assert_eq!(protocol.price("ETH", 5).unwrap(), 2000 * WAD);
    }
}
