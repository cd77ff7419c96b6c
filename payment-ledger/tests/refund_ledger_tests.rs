use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use payment_ledger::{
    Currency, ErrorKind, InMemoryLedgerStore, LedgerError, LedgerService, Payment, PaymentFilter, PaymentMethod,
    PaymentStatus, RefundRequest,
};
use rstest::rstest;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 4, day, hour, 0, 0).unwrap()
}

fn ymd(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 4, day).unwrap()
}

fn payment(id: &str, organisation_id: &str, amount: Decimal) -> Payment {
    Payment {
        id: id.to_string(),
        organisation_id: organisation_id.to_string(),
        payer_id: "user_1".to_string(),
        payer_name: Some("Ciara Walsh".to_string()),
        payer_email: Some("ciara.walsh@example.ie".to_string()),
        payment_type: "event_entry".to_string(),
        context_id: Some("entry_1".to_string()),
        amount,
        currency: Currency::new("EUR").unwrap(),
        method: PaymentMethod::Card,
        status: PaymentStatus::Paid,
        provider: Some("stripe".to_string()),
        provider_transaction_id: Some(format!("pi_{}", id)),
        settlement_date: Some(at(10, 12)),
        metadata: Some(r#"{"source":"checkout"}"#.to_string()),
        created_at: at(10, 11),
        updated_at: at(10, 12),
    }
}

fn refund_request(payment_id: &str, organisation_id: &str, amount: Decimal) -> RefundRequest {
    RefundRequest {
        payment_id: payment_id.to_string(),
        organisation_id: organisation_id.to_string(),
        refund_amount: amount,
        refund_reason: Some("entry withdrawn".to_string()),
        requested_by: "admin_1".to_string(),
        metadata: None,
    }
}

async fn service_with(payments: Vec<Payment>) -> LedgerService {
    let service = LedgerService::in_memory(InMemoryLedgerStore::new());
    for p in payments {
        service.record_payment(p).await.unwrap();
    }
    service
}

#[tokio::test]
async fn test_refunds_never_exceed_payment_amount() {
    let service = service_with(vec![payment("pay_1", "org_1", dec!(50.00))]).await;

    let attempts = [dec!(20.00), dec!(20.00), dec!(20.00), dec!(10.00), dec!(0.01)];
    let mut accepted = Decimal::ZERO;
    for amount in attempts {
        if service
            .request_refund(refund_request("pay_1", "org_1", amount))
            .await
            .is_ok()
        {
            accepted += amount;
        }
        assert!(accepted <= dec!(50.00));
    }

    assert_eq!(accepted, dec!(50.00));
    let balance = service.get_refundable_balance("org_1", "pay_1").await.unwrap();
    assert_eq!(balance.amount, Decimal::ZERO);
}

#[tokio::test]
async fn test_overcommit_reports_remaining_amount() {
    let service = service_with(vec![payment("pay_1", "org_1", dec!(100.00))]).await;

    service
        .request_refund(refund_request("pay_1", "org_1", dec!(60.00)))
        .await
        .unwrap();

    let err = service
        .request_refund(refund_request("pay_1", "org_1", dec!(45.00)))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(err.status_code(), 400);
    assert!(err.to_string().contains("40.00 EUR"), "{}", err);

    let refund = service
        .request_refund(refund_request("pay_1", "org_1", dec!(40.00)))
        .await
        .unwrap();
    assert_eq!(refund.refund_amount, dec!(40.00));
    assert_eq!(refund.organisation_id, "org_1");
}

#[tokio::test]
async fn test_cross_tenant_refund_is_forbidden() {
    let service = service_with(vec![payment("pay_1", "org_1", dec!(100.00))]).await;

    let err = service
        .request_refund(refund_request("pay_1", "org_2", dec!(10.00)))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Forbidden(_)));
    assert_eq!(err.status_code(), 403);

    // 被拒绝的请求不占用额度
    let balance = service.get_refundable_balance("org_1", "pay_1").await.unwrap();
    assert_eq!(balance.amount, dec!(100.00));
}

#[tokio::test]
async fn test_unknown_payment_is_not_found() {
    let service = service_with(vec![]).await;

    let err = service
        .request_refund(refund_request("missing", "org_1", dec!(1.00)))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(err.status_code(), 404);
}

#[rstest]
#[case::pending(PaymentStatus::Pending)]
#[case::refunded(PaymentStatus::Refunded)]
#[case::failed(PaymentStatus::Failed)]
#[tokio::test]
async fn test_only_paid_payments_are_refundable(#[case] status: PaymentStatus) {
    let mut p = payment("pay_1", "org_1", dec!(100.00));
    p.status = status;
    let service = service_with(vec![p]).await;

    let err = service
        .request_refund(refund_request("pay_1", "org_1", dec!(10.00)))
        .await
        .unwrap_err();

    match err {
        LedgerError::InvalidState { status: current, .. } => assert_eq!(current, status),
        other => panic!("expected InvalidState, got {:?}", other),
    }
}

#[rstest]
#[case::zero(dec!(0))]
#[case::negative(dec!(-5.00))]
#[case::sub_cent(dec!(0.001))]
#[case::above_amount(dec!(100.01))]
#[tokio::test]
async fn test_invalid_refund_amounts(#[case] amount: Decimal) {
    let service = service_with(vec![payment("pay_1", "org_1", dec!(100.00))]).await;

    let err = service
        .request_refund(refund_request("pay_1", "org_1", amount))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[tokio::test]
async fn test_exact_remaining_boundary() {
    let service = service_with(vec![payment("pay_1", "org_1", dec!(100.00))]).await;
    service
        .request_refund(refund_request("pay_1", "org_1", dec!(60.00)))
        .await
        .unwrap();

    let err = service
        .request_refund(refund_request("pay_1", "org_1", dec!(40.01)))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    service
        .request_refund(refund_request("pay_1", "org_1", dec!(40.00)))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_concurrent_refunds_do_not_overcommit() {
    let service = Arc::new(service_with(vec![payment("pay_1", "org_1", dec!(100.00))]).await);

    let handles: Vec<_> = (0..20)
        .map(|_| {
            let service = service.clone();
            tokio::spawn(async move {
                service
                    .request_refund(refund_request("pay_1", "org_1", dec!(15.00)))
                    .await
                    .is_ok()
            })
        })
        .collect();

    let mut accepted = 0;
    for handle in handles {
        if handle.await.unwrap() {
            accepted += 1;
        }
    }

    // 100 / 15 = 6 次
    assert_eq!(accepted, 6);
    let history = service.get_refunds_for_payment("org_1", "pay_1").await.unwrap();
    let committed: Decimal = history.iter().map(|r| r.refund_amount).sum();
    assert_eq!(committed, dec!(90.00));
}

#[tokio::test]
async fn test_listing_is_scoped_to_organisation() {
    let service = service_with(vec![
        payment("pay_1", "org_1", dec!(10.00)),
        payment("pay_2", "org_1", dec!(20.00)),
        payment("pay_3", "org_2", dec!(30.00)),
    ])
    .await;

    let org_1 = service.get_payments_by_organisation("org_1", None).await.unwrap();
    assert_eq!(org_1.len(), 2);
    assert!(org_1.iter().all(|p| p.organisation_id == "org_1"));

    let nobody = service.get_payments_by_organisation("org_9", None).await.unwrap();
    assert!(nobody.is_empty());
}

#[tokio::test]
async fn test_filters_compose_with_and() {
    let mut cash = payment("pay_cash", "org_1", dec!(10.00));
    cash.method = PaymentMethod::Cash;
    cash.provider_transaction_id = None;

    let mut pending_card = payment("pay_pending", "org_1", dec!(10.00));
    pending_card.status = PaymentStatus::Pending;

    let mut membership = payment("pay_member", "org_1", dec!(10.00));
    membership.payment_type = "membership".to_string();
    membership.payer_name = Some("Declan Murphy".to_string());
    membership.payer_email = Some("declan@example.ie".to_string());

    let mut early = payment("pay_early", "org_1", dec!(10.00));
    early.settlement_date = Some(at(1, 9));

    let service = service_with(vec![
        payment("pay_match", "org_1", dec!(10.00)),
        cash,
        pending_card,
        membership,
        early,
    ])
    .await;

    let filter = PaymentFilter::new()
        .with_status([PaymentStatus::Paid])
        .with_method([PaymentMethod::Card])
        .with_type(["event_entry"])
        .with_date_range(Some(ymd(5)), Some(ymd(15)));

    let ids: Vec<String> = service
        .get_payments_by_organisation("org_1", Some(&filter))
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.id)
        .collect();
    assert_eq!(ids, vec!["pay_match".to_string()]);

    // 多值维度内为 OR
    let either_type = PaymentFilter::new().with_type(["event_entry", "membership"]);
    let found = service
        .get_payments_by_organisation("org_1", Some(&either_type))
        .await
        .unwrap();
    assert_eq!(found.len(), 5);
}

#[tokio::test]
async fn test_search_is_case_insensitive_substring() {
    let mut other = payment("pay_2", "org_1", dec!(5.00));
    other.payer_name = Some("Declan Murphy".to_string());
    other.payer_email = Some("declan@example.ie".to_string());
    let service = service_with(vec![payment("pay_1", "org_1", dec!(5.00)), other]).await;

    for term in ["  WALSH ", "ciara.walsh@", "PI_PAY_1"] {
        let filter = PaymentFilter::new().with_search(term);
        let found = service
            .get_payments_by_organisation("org_1", Some(&filter))
            .await
            .unwrap();
        assert_eq!(found.len(), 1, "term {:?}", term);
        assert_eq!(found[0].id, "pay_1");
    }

    // 空白搜索词等同于不过滤
    let blank = PaymentFilter::new().with_search("   ");
    let found = service
        .get_payments_by_organisation("org_1", Some(&blank))
        .await
        .unwrap();
    assert_eq!(found.len(), 2);
}

#[tokio::test]
async fn test_date_range_is_inclusive_by_day() {
    let mut first = payment("pay_first", "org_1", dec!(1.00));
    first.settlement_date = Some(Utc.with_ymd_and_hms(2024, 4, 5, 0, 0, 0).unwrap());
    let mut last = payment("pay_last", "org_1", dec!(1.00));
    last.settlement_date = Some(Utc.with_ymd_and_hms(2024, 4, 6, 23, 59, 59).unwrap());
    let mut after = payment("pay_after", "org_1", dec!(1.00));
    after.settlement_date = Some(Utc.with_ymd_and_hms(2024, 4, 7, 0, 0, 0).unwrap());
    let mut unsettled = payment("pay_unsettled", "org_1", dec!(1.00));
    unsettled.settlement_date = None;

    let service = service_with(vec![first, last, after, unsettled]).await;

    let filter = PaymentFilter::new().with_date_range(Some(ymd(5)), Some(ymd(6)));
    let ids: Vec<String> = service
        .get_payments_by_organisation("org_1", Some(&filter))
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.id)
        .collect();
    assert_eq!(ids, vec!["pay_last".to_string(), "pay_first".to_string()]);

    let inverted = PaymentFilter::new().with_date_range(Some(ymd(6)), Some(ymd(5)));
    assert!(service
        .get_payments_by_organisation("org_1", Some(&inverted))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_lodgements_group_and_preserve_totals() {
    let mut card_a = payment("pay_a", "org_1", dec!(12.50));
    card_a.settlement_date = Some(at(2, 9));
    let mut card_b = payment("pay_b", "org_1", dec!(7.50));
    card_b.settlement_date = Some(at(2, 18));
    let mut cash = payment("pay_c", "org_1", dec!(20.00));
    cash.method = PaymentMethod::Cash;
    cash.settlement_date = Some(at(2, 10));
    let mut next_day = payment("pay_d", "org_1", dec!(5.00));
    next_day.settlement_date = Some(at(3, 10));
    let mut pending = payment("pay_e", "org_1", dec!(99.00));
    pending.status = PaymentStatus::Pending;
    let other_org = payment("pay_f", "org_2", dec!(99.00));

    let service = service_with(vec![card_a, card_b, cash, next_day, pending, other_org]).await;

    let summary = service
        .get_lodgements_by_organisation("org_1", Some(ymd(1)), Some(ymd(3)))
        .await
        .unwrap();

    assert_eq!(summary.len(), 3);
    assert_eq!(summary[0].date, ymd(3));
    assert_eq!((summary[1].date, summary[1].payment_method), (ymd(2), PaymentMethod::Card));
    assert_eq!(summary[1].total_amount, dec!(20.00));
    assert_eq!(summary[1].transaction_count, 2);
    assert_eq!((summary[2].date, summary[2].payment_method), (ymd(2), PaymentMethod::Cash));

    let total: Decimal = summary.iter().map(|s| s.total_amount).sum();
    assert_eq!(total, dec!(45.00));

    // 无写入时重复查询结果一致
    let again = service
        .get_lodgements_by_organisation("org_1", Some(ymd(1)), Some(ymd(3)))
        .await
        .unwrap();
    assert_eq!(summary, again);
}

#[tokio::test]
async fn test_lodgements_empty_range() {
    let service = service_with(vec![payment("pay_1", "org_1", dec!(10.00))]).await;

    let summary = service
        .get_lodgements_by_organisation("org_1", Some(ymd(20)), Some(ymd(25)))
        .await
        .unwrap();
    assert!(summary.is_empty());
}

#[tokio::test]
async fn test_refund_history_is_oldest_first_and_scoped() {
    let service = service_with(vec![payment("pay_1", "org_1", dec!(30.00))]).await;

    let first = service
        .request_refund(refund_request("pay_1", "org_1", dec!(10.00)))
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let second = service
        .request_refund(refund_request("pay_1", "org_1", dec!(5.00)))
        .await
        .unwrap();

    let history = service.get_refunds_for_payment("org_1", "pay_1").await.unwrap();
    let ids: Vec<&str> = history.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec![first.id.as_str(), second.id.as_str()]);

    let err = service.get_refunds_for_payment("org_2", "pay_1").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
}
