// Sample entity and repository for seawall-inspect

struct Address {
    street: String,
    zip_code: i32,
}

#[unique_key = "customer, placed_on"]
struct PurchaseOrder {
    #[id]
    id: i64,
    customer: String,
    placed_on: NaiveDate,
    total: Option<Decimal>,
    shipped: bool,
    address: Address,
}

trait PurchaseOrderRepository {
    fn findByAddress_ZipCode(&self, zip: i32) -> Vec<PurchaseOrder>;

    fn findByShippedFalseOrderByPlacedOnDescIdAsc(&self, page: PageRequest) -> Page<PurchaseOrder>;

    #[order_by = "customer, placed_on desc"]
    fn findByTotalBetween(&self, low: Decimal, high: Decimal, page: PageRequest) -> Page<PurchaseOrder>;

    #[query = "SELECT * FROM purchase_order WHERE customer = :customer ORDER BY placed_on"]
    fn recentForCustomer(&self, customer: String) -> Vec<PurchaseOrder>;

    fn countByCustomerIgnoreCase(&self, customer: &str) -> u64;
}
